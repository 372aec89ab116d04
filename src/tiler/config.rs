//! # 配置模块
//!
//! ## 设计思路
//!
//! 两类配置分开管理：
//! - `GridSpec`：单次拼图的版式（格子边长、间距、每行数量），随调用显式传入，不存在全局常量。
//! - `TilerConfig`：下载、解码、缩放与并发等可调策略，由 `TileHandler` 持有。
//!
//! 性能档位（quality / balanced / speed）作为高层语义，映射到底层参数组合。
//!
//! ## 实现思路
//!
//! - `GridSpec::validate` 在任何 I/O 之前快速失败。
//! - `Default` 提供生产可用配置，缩放滤镜默认 Lanczos3。
//! - `apply_performance_profile` / `infer_performance_profile` 双向映射档位。

use image::imageops::FilterType;

use super::TileError;

/// 拼图版式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    /// 缩略图边长（像素）。
    pub tile_size: u32,
    /// 格子之间透明间隔宽度（像素）。
    pub spacing: u32,
    /// 每行格子数。
    pub row_length: u32,
}

impl GridSpec {
    /// 构建并校验版式。
    ///
    /// # 示例
    /// ```rust
    /// use image_tiler::tiler::GridSpec;
    ///
    /// let spec = GridSpec::new(136, 6, 4)?;
    /// assert_eq!(spec.row_width(), 6 * 136 + 5 * 4);
    /// # Ok::<(), image_tiler::tiler::TileError>(())
    /// ```
    pub fn new(tile_size: u32, row_length: u32, spacing: u32) -> Result<Self, TileError> {
        let spec = Self {
            tile_size,
            spacing,
            row_length,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), TileError> {
        if self.tile_size == 0 {
            return Err(TileError::InvalidSpec("tile_size 必须大于 0".to_string()));
        }
        if self.row_length == 0 {
            return Err(TileError::InvalidSpec("row_length 必须大于 0".to_string()));
        }
        // 画布边长需能放进 u32
        self.checked_extent(self.row_length)
            .ok_or_else(|| TileError::InvalidSpec("画布宽度溢出".to_string()))?;
        Ok(())
    }

    /// 行数：`ceil(count / row_length)`。
    pub fn rows_for(&self, count: usize) -> usize {
        count.div_ceil(self.row_length as usize)
    }

    /// `count` 个格子对应的画布高度；溢出 u32 时报错。
    pub fn canvas_height(&self, count: usize) -> Result<u32, TileError> {
        u32::try_from(self.rows_for(count))
            .ok()
            .and_then(|rows| self.checked_extent(rows))
            .ok_or_else(|| TileError::InvalidSpec(format!("画布高度溢出：{} 个格子", count)))
    }

    /// 一行（含间隔）的像素宽度。
    pub fn row_width(&self) -> u32 {
        self.extent(self.row_length)
    }

    /// `n` 个格子加 `n - 1` 条间隔的长度，`n == 0` 时为 0。
    pub(crate) fn extent(&self, n: u32) -> u32 {
        self.checked_extent(n).unwrap_or(u32::MAX)
    }

    fn checked_extent(&self, n: u32) -> Option<u32> {
        if n == 0 {
            return Some(0);
        }
        let tiles = n.checked_mul(self.tile_size)?;
        let gutters = (n - 1).checked_mul(self.spacing)?;
        tiles.checked_add(gutters)
    }
}

/// 拼图处理配置。
#[derive(Debug, Clone)]
pub struct TilerConfig {
    /// 单个来源允许的最大原始字节数。
    pub max_file_size: u64,
    /// 整体请求超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 可重试网络错误的最大尝试次数（含首次）。
    pub network_retries: u8,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 同时进行中的解析任务上限。
    pub max_concurrency: usize,
    /// 缩略图缩放滤镜。
    pub resize_filter: FilterType,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            network_retries: 3,
            max_decoded_pixels: 40_000_000,
            max_concurrency: 8,
            resize_filter: FilterType::Lanczos3,
        }
    }
}

/// 性能档位。
///
/// - `Quality`：Lanczos3，默认
/// - `Balanced`：CatmullRom
/// - `Speed`：Triangle，并发加倍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilePerformanceProfile {
    Quality,
    Balanced,
    Speed,
}

impl TilePerformanceProfile {
    /// 从外部字符串解析档位。
    pub fn parse(profile: &str) -> Result<Self, TileError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(TileError::InvalidSpec(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl TilerConfig {
    /// 基于当前缩放滤镜反推性能档位。
    pub(crate) fn infer_performance_profile(&self) -> TilePerformanceProfile {
        match self.resize_filter {
            FilterType::Lanczos3 | FilterType::Gaussian => TilePerformanceProfile::Quality,
            FilterType::CatmullRom => TilePerformanceProfile::Balanced,
            FilterType::Triangle | FilterType::Nearest => TilePerformanceProfile::Speed,
        }
    }

    /// 应用指定性能档位到实际参数。
    pub(crate) fn apply_performance_profile(&mut self, profile: TilePerformanceProfile) {
        match profile {
            TilePerformanceProfile::Quality => {
                self.resize_filter = FilterType::Lanczos3;
                self.max_concurrency = 8;
            }
            TilePerformanceProfile::Balanced => {
                self.resize_filter = FilterType::CatmullRom;
                self.max_concurrency = 8;
            }
            TilePerformanceProfile::Speed => {
                self.resize_filter = FilterType::Triangle;
                self.max_concurrency = 16;
            }
        }
    }
}
