//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `Reference` 表示调用方给出的图片来源
//! - `RawImageData` 表示已加载但未解码的字节
//! - `RawImage` 表示已解码、尚未规整的像素
//! - `Thumbnail` 表示边长精确的 RGBA 缩略图
//! - `Canvas` 表示最终拼好的整张画布

use std::fmt;
use std::path::PathBuf;

use image::{DynamicImage, Rgba, RgbaImage};

/// 空白格像素：白色、完全透明。
pub const BLANK_PIXEL: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// 调用方用来显式占位的空白哨兵字符串。
pub const BLANK_SENTINEL: &str = "empty";

/// 图片输入来源。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// 本地文件路径。
    LocalPath(PathBuf),
    /// 网络地址（http / https）。
    RemoteUrl(String),
    /// `data:image/...;base64,` 内联数据。
    DataUrl(String),
    /// 显式空白格。
    Blank,
}

impl Reference {
    /// 将调用方字符串归类为来源。
    ///
    /// # 示例
    /// ```rust
    /// use image_tiler::tiler::Reference;
    ///
    /// assert_eq!(Reference::parse("empty"), Reference::Blank);
    /// assert!(matches!(Reference::parse("https://example.com/a.png"), Reference::RemoteUrl(_)));
    /// assert!(matches!(Reference::parse("./pic/fish.png"), Reference::LocalPath(_)));
    /// ```
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed == BLANK_SENTINEL {
            return Self::Blank;
        }

        if trimmed.starts_with("data:image/") {
            return Self::DataUrl(trimmed.to_string());
        }

        if let Ok(url) = reqwest::Url::parse(trimmed) {
            if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
                return Self::RemoteUrl(trimmed.to_string());
            }
        }

        Self::LocalPath(PathBuf::from(trimmed))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalPath(_) => "file",
            Self::RemoteUrl(_) => "url",
            Self::DataUrl(_) => "data-url",
            Self::Blank => "blank",
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalPath(path) => write!(f, "{}", path.display()),
            Self::RemoteUrl(url) => write!(f, "{}", url),
            Self::DataUrl(data) => write!(f, "{}…", data.chars().take(24).collect::<String>()),
            Self::Blank => f.write_str(BLANK_SENTINEL),
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码阶段输出：任意尺寸的像素数据。
#[derive(Debug, Clone)]
pub struct RawImage {
    pub pixels: DynamicImage,
    pub width: u32,
    pub height: u32,
    /// 源图通道数（灰度 1/2，RGB 3，RGBA 4）。
    pub channels: u8,
    pub reference: Reference,
}

impl RawImage {
    pub fn new(pixels: DynamicImage, reference: Reference) -> Self {
        let width = pixels.width();
        let height = pixels.height();
        let channels = pixels.color().channel_count();
        Self {
            pixels,
            width,
            height,
            channels,
            reference,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 边长精确为 `side` 的 RGBA 缩略图。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pixels: RgbaImage,
}

impl Thumbnail {
    /// 调用方保证 `pixels` 为正方形。
    pub(crate) fn from_exact(pixels: RgbaImage) -> Self {
        debug_assert_eq!(pixels.width(), pixels.height());
        Self { pixels }
    }

    pub fn side(&self) -> u32 {
        self.pixels.width()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// RGBA 字节（`side * side * 4`）。
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|px| *px == BLANK_PIXEL)
    }
}

/// 最终画布。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub(crate) fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// RGBA 字节（`width * height * 4`）。
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.image.into_raw()
    }

    /// 交给外部编码器（如 PNG）写出。
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// 截取第 `index` 个格子（行优先），用于校验与调试。
    pub fn tile_at(&self, index: usize, spec: &super::GridSpec) -> Option<RgbaImage> {
        let row_length = spec.row_length as usize;
        let (row, col) = (index / row_length, index % row_length);
        let stride = spec.tile_size.checked_add(spec.spacing)?;
        let x = u32::try_from(col).ok()?.checked_mul(stride)?;
        let y = u32::try_from(row).ok()?.checked_mul(stride)?;

        if x.checked_add(spec.tile_size)? > self.width() || y.checked_add(spec.tile_size)? > self.height() {
            return None;
        }

        Some(
            image::imageops::crop_imm(&self.image, x, y, spec.tile_size, spec.tile_size).to_image(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_references() {
        assert_eq!(Reference::parse("empty"), Reference::Blank);
        assert_eq!(
            Reference::parse("http://example.com/cat.jpg?itok=abc"),
            Reference::RemoteUrl("http://example.com/cat.jpg?itok=abc".to_string())
        );
        assert!(matches!(
            Reference::parse("data:image/png;base64,iVBORw0KGgo="),
            Reference::DataUrl(_)
        ));
        assert_eq!(
            Reference::parse("./pic/bamboo.jpg"),
            Reference::LocalPath(PathBuf::from("./pic/bamboo.jpg"))
        );
    }

    #[test]
    fn parse_keeps_non_http_schemes_local() {
        assert!(matches!(Reference::parse("C:/pics/a.png"), Reference::LocalPath(_)));
        assert!(matches!(Reference::parse("ftp://example.com/a.png"), Reference::LocalPath(_)));
        assert!(matches!(Reference::parse("Empty"), Reference::LocalPath(_)));
    }

    #[test]
    fn parse_trims_local_paths_like_other_kinds() {
        assert_eq!(
            Reference::parse("  pic/a.png \n"),
            Reference::LocalPath(PathBuf::from("pic/a.png"))
        );
        assert_eq!(Reference::parse(" empty "), Reference::Blank);
    }

    #[test]
    fn thumbnail_reports_side_and_blankness() {
        let thumb = Thumbnail::from_exact(RgbaImage::from_pixel(3, 3, BLANK_PIXEL));
        assert_eq!(thumb.side(), 3);
        assert_eq!(thumb.as_raw().len(), 3 * 3 * 4);
        assert!(thumb.is_blank());

        let mut pixels = RgbaImage::from_pixel(3, 3, BLANK_PIXEL);
        pixels.put_pixel(1, 1, Rgba([255, 255, 255, 1]));
        assert!(!Thumbnail::from_exact(pixels).is_blank());
    }

    #[test]
    fn raw_image_records_channels() {
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::new(2, 3));
        let raw = RawImage::new(rgb, Reference::Blank);
        assert_eq!((raw.width, raw.height, raw.channels), (2, 3, 3));
        assert!(!raw.is_empty());
    }
}
