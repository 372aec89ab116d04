//! # 来源解析模块
//!
//! ## 设计思路
//!
//! 解析器的契约是“全函数”：任何来源要么得到 `RawImage`，要么得到 `Unavailable`，
//! 永远不会把网络抖动、解码失败等异常抛给调用方。
//! 失败原因仍以 `TileError` 形式保留，供日志与报告使用。
//!
//! ## 实现思路
//!
//! - `load`：按来源取得原始字节（异步，可能走网络）。
//! - `resolve`：`load` + 同步解码。
//! - Base64 在解码前先按长度估算体积上限，超限直接拒绝。

use base64::{Engine as _, engine::general_purpose};

use super::pipeline::decode_raw_image;
use super::source::{RawImage, RawImageData, Reference};
use super::transport::{Fetch, FetchError, OpenError, OpenFile, redact_url_for_log};
use super::{TileError, TilerConfig};

/// 来源无法变成可用像素。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// 显式空白格，无需加载。
    Blank,
    /// 加载或解码失败。
    Failed(TileError),
}

impl Unavailable {
    pub fn error(&self) -> Option<&TileError> {
        match self {
            Self::Blank => None,
            Self::Failed(err) => Some(err),
        }
    }
}

impl From<TileError> for Unavailable {
    fn from(error: TileError) -> Self {
        Self::Failed(error)
    }
}

/// 来源解析器，持有注入的获取与读取能力。
pub struct SourceResolver<F, O> {
    fetcher: F,
    opener: O,
}

impl<F: Fetch, O: OpenFile> SourceResolver<F, O> {
    pub fn new(fetcher: F, opener: O) -> Self {
        Self { fetcher, opener }
    }

    /// 解析来源为解码后的像素。
    pub async fn resolve(
        &self,
        reference: &Reference,
        config: &TilerConfig,
    ) -> Result<RawImage, Unavailable> {
        let raw = self.load(reference, config).await?;
        Ok(decode_raw_image(raw, reference.clone(), config)?)
    }

    /// 取得来源的原始字节。
    pub(crate) async fn load(
        &self,
        reference: &Reference,
        config: &TilerConfig,
    ) -> Result<RawImageData, Unavailable> {
        match reference {
            Reference::Blank => Err(Unavailable::Blank),
            Reference::LocalPath(path) => {
                log::debug!("📁 读取本地图片 - 路径: {}", path.display());
                let bytes = self.opener.open(path).map_err(map_open_error)?;
                Ok(RawImageData {
                    bytes,
                    source_hint: "file",
                })
            }
            Reference::RemoteUrl(url) => {
                log::debug!("🌐 下载图片 - URL: {}", redact_url_for_log(url));
                let bytes = self.fetcher.fetch(url).await.map_err(map_fetch_error)?;
                Ok(RawImageData {
                    bytes,
                    source_hint: "url",
                })
            }
            Reference::DataUrl(data) => {
                let bytes = parse_base64_with_limit(data, config.max_file_size)?;
                Ok(RawImageData {
                    bytes,
                    source_hint: "data-url",
                })
            }
        }
    }
}

fn map_fetch_error(error: FetchError) -> TileError {
    match error {
        FetchError::Timeout(msg) => TileError::Timeout(msg),
        FetchError::HttpStatus(code) => {
            TileError::Network(format!("HTTP {}: {}", code, status_message(code)))
        }
        FetchError::Network(msg) => TileError::Network(msg),
        FetchError::InvalidResponse(msg) => TileError::InvalidFormat(msg),
        FetchError::TooLarge(size) => TileError::ResourceLimit(format!(
            "文件过大：{:.2} MB",
            size as f64 / 1024.0 / 1024.0
        )),
    }
}

fn map_open_error(error: OpenError) -> TileError {
    match error {
        OpenError::NotFound(path) => TileError::FileSystem(format!("文件不存在：{}", path)),
        OpenError::TooLarge(size) => TileError::ResourceLimit(format!(
            "文件过大：{:.2} MB",
            size as f64 / 1024.0 / 1024.0
        )),
        OpenError::Io(msg) => TileError::FileSystem(msg),
    }
}

fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> u64 {
    let len = base64_data.trim().len() as u64;
    len.div_ceil(4).saturating_mul(3)
}

fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, TileError> {
    let base64_start = data
        .find(";base64,")
        .ok_or_else(|| TileError::InvalidFormat("缺少 base64 标记".to_string()))?;
    let base64_data = data[base64_start + 8..].trim();

    let estimated_len = estimate_base64_decoded_upper_bound_len(base64_data);
    if estimated_len > max_file_size {
        return Err(TileError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(base64_data)
        .map_err(|e| TileError::Decode(format!("Base64 解码失败：{}", e)))
}
