//! # 传输能力模块
//!
//! ## 设计思路
//!
//! 解析器只依赖两个注入能力：
//! - `Fetch`：URL → 内存字节
//! - `OpenFile`：本地路径 → 内存字节
//!
//! 默认实现分别基于 `reqwest` 与 `std::fs`，测试可注入桩实现，
//! 不需要真实网络即可覆盖降级路径。
//!
//! ## 实现思路
//!
//! - URL：协议校验 + 有限重定向 + 可重试状态码/网络错误退避重试 +
//!   内容类型与体积校验 + 带首包/分块超时的流式下载。
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - 下载字节始终留在内存中，不落盘。

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::TilerConfig;

const NETWORK_RETRY_BASE_DELAY_MS: u64 = 180;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 网络获取失败原因。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("请求超时：{0}")]
    Timeout(String),

    #[error("HTTP {0}")]
    HttpStatus(u16),

    #[error("网络失败：{0}")]
    Network(String),

    #[error("响应无效：{0}")]
    InvalidResponse(String),

    #[error("响应过大：{0} 字节")]
    TooLarge(u64),
}

/// 本地读取失败原因。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("文件不存在：{0}")]
    NotFound(String),

    #[error("文件过大：{0} 字节")]
    TooLarge(u64),

    #[error("读取失败：{0}")]
    Io(String),
}

/// 网络获取能力。
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// 本地文件读取能力。
pub trait OpenFile: Send + Sync {
    fn open(&self, path: &Path) -> Result<Vec<u8>, OpenError>;
}

/// 基于 `reqwest` 的默认获取实现。
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: TilerConfig,
}

impl HttpFetcher {
    pub fn new(config: TilerConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { client, config })
    }

    async fn send_with_retry(&self, url: reqwest::Url) -> Result<reqwest::Response, FetchError> {
        let max_attempts = self.config.network_retries.max(1);
        let mut attempt: u8 = 1;

        loop {
            match self.send(url.clone()).await {
                Ok(resp) => {
                    if attempt < max_attempts && Self::is_retryable_http_status(resp.status()) {
                        let delay_ms = Self::compute_retry_delay_with_jitter(
                            attempt,
                            Self::retry_after_hint_ms(resp.headers()),
                        );
                        log::warn!(
                            "⚠️ HTTP {}（第 {}/{} 次，可重试）；{}ms 后重试",
                            resp.status().as_u16(),
                            attempt,
                            max_attempts,
                            delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Ok(resp);
                }
                Err(err) => {
                    if attempt >= max_attempts || !Self::is_retryable_network_error(&err) {
                        return Err(self.map_reqwest_error(err, url.as_str()));
                    }

                    let delay_ms = Self::compute_retry_delay_with_jitter(attempt, None);
                    log::warn!(
                        "⚠️ 网络请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        max_attempts,
                        Self::sanitize_error_message(&err.to_string(), url.as_str()),
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn send(&self, url: reqwest::Url) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .get(url)
            .header(reqwest::header::USER_AGENT, concat!("image-tiler/", env!("CARGO_PKG_VERSION")))
            .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
            .send()
            .await
    }

    /// 带首包/分块超时与体积上限的流式读取。
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let total_len = response.content_length();
        if let Some(size) = total_len {
            if size > self.config.max_file_size {
                return Err(FetchError::TooLarge(size));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(self.config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(self.config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(self.config.stream_first_byte_timeout_ms)
            };

            let next_chunk = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        FetchError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        FetchError::Timeout("下载首包超时".to_string())
                    }
                })?
                .map_err(|e| FetchError::Network(format!("下载失败：{}", e)))?;

            let Some(chunk) = next_chunk else {
                break;
            };
            received_first_chunk = true;

            let total = buffer.len() as u64 + chunk.len() as u64;
            if total > self.config.max_file_size {
                return Err(FetchError::TooLarge(total));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }

    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> FetchError {
        let err_msg = Self::sanitize_error_message(&e.to_string(), url);

        if e.is_timeout() {
            FetchError::Timeout(format!("下载超时（{}秒）", self.config.download_timeout))
        } else if e.is_redirect() {
            FetchError::Network(format!("重定向次数超过限制（{}）", self.config.max_redirects))
        } else if e.is_connect() {
            FetchError::Network(format!("无法连接：{}", err_msg))
        } else {
            FetchError::Network(format!("请求失败：{}", err_msg))
        }
    }

    fn sanitize_error_message(error_msg: &str, url: &str) -> String {
        error_msg.replace(url, &redact_url_for_log(url))
    }

    fn retry_after_hint_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        let value = headers.get(reqwest::header::RETRY_AFTER)?;
        let secs = value.to_str().ok()?.trim().parse::<u64>().ok()?;
        Some(secs.saturating_mul(1000))
    }

    fn compute_retry_delay_with_jitter(attempt: u8, server_hint_ms: Option<u64>) -> u64 {
        let exp = NETWORK_RETRY_BASE_DELAY_MS
            .saturating_mul(1_u64 << (attempt.saturating_sub(1).min(8) as u32));
        let base = server_hint_ms.unwrap_or(exp);
        let jitter_bound = (base / 2).max(1);
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        base.saturating_add(seed % (jitter_bound + 1))
    }

    fn is_retryable_http_status(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
    }

    fn is_retryable_network_error(error: &reqwest::Error) -> bool {
        if error.is_timeout() || error.is_connect() {
            return true;
        }

        let msg = error.to_string().to_lowercase();
        msg.contains("connection reset")
            || msg.contains("connection closed before message completed")
            || msg.contains("unexpected eof during handshake")
    }

    /// `image/*` 或通用二进制类型；二进制内容交给解码阶段的签名校验判断。
    fn is_acceptable_content_type(content_type: &str) -> bool {
        let base = content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase())
            .unwrap_or_default();

        base.starts_with("image/") || matches!(base.as_str(), "application/octet-stream" | "binary/octet-stream")
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| FetchError::InvalidResponse(format!("URL 格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidResponse("仅支持 HTTP/HTTPS".to_string()));
        }

        log::debug!("📡 发送 HTTP 请求 - {}", redact_url_for_log(url));
        let response = self.send_with_retry(parsed).await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            if let Ok(ct_str) = ct.to_str() {
                if !Self::is_acceptable_content_type(ct_str) {
                    return Err(FetchError::InvalidResponse(format!("不是图片类型：{}", ct_str)));
                }
            }
        }

        let bytes = self.read_body(response).await?;
        log::debug!("✅ 下载完成 - {} bytes", bytes.len());
        Ok(bytes)
    }
}

/// 基于本地文件系统的默认读取实现。
#[derive(Debug, Clone)]
pub struct LocalFiles {
    max_file_size: u64,
}

impl LocalFiles {
    pub fn new(config: &TilerConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
        }
    }
}

impl OpenFile for LocalFiles {
    fn open(&self, path: &Path) -> Result<Vec<u8>, OpenError> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => OpenError::NotFound(path.display().to_string()),
            _ => OpenError::Io(format!("无法读取文件信息：{}", e)),
        })?;

        if !metadata.is_file() {
            return Err(OpenError::NotFound(path.display().to_string()));
        }

        if metadata.len() > self.max_file_size {
            return Err(OpenError::TooLarge(metadata.len()));
        }

        std::fs::read(path).map_err(|e| OpenError::Io(format!("无法读取图片文件：{}", e)))
    }
}

/// 去掉 query 与 fragment 后用于日志的 URL。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}
