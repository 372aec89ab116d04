//! # 解码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做签名与尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 通过文件签名（magic bytes）确认是图片
//! 2. 读取 header 尺寸，零尺寸或超出像素上限直接拒绝
//! 3. 完整解码，并复核解码后尺寸

use std::io::Cursor;

use super::source::{RawImage, RawImageData, Reference};
use super::{TileError, TilerConfig};

/// 将原始字节解码为任意尺寸的像素数据。
pub(crate) fn decode_raw_image(
    raw: RawImageData,
    reference: Reference,
    config: &TilerConfig,
) -> Result<RawImage, TileError> {
    validate_image_signature(&raw.bytes)?;

    let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
    validate_dimensions(config, header_width, header_height)?;

    let decoded = image::load_from_memory(&raw.bytes)
        .map_err(|e| TileError::Decode(format!("图片解码失败：{}", e)))?;

    let image = RawImage::new(decoded, reference);
    validate_dimensions(config, image.width, image.height)?;

    log::debug!(
        "🖼️ 图片解码成功 - 来源: {} 尺寸: {}x{} 通道: {}",
        raw.source_hint,
        image.width,
        image.height,
        image.channels
    );

    Ok(image)
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), TileError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| TileError::InvalidFormat(format!("无法识别图片格式：{}", e)))?
        .into_dimensions()
        .map_err(|e| TileError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

fn validate_dimensions(config: &TilerConfig, width: u32, height: u32) -> Result<(), TileError> {
    if width == 0 || height == 0 {
        return Err(TileError::Decode(format!("图片尺寸为零：{}x{}", width, height)));
    }

    let pixels = (width as u64) * (height as u64);
    if pixels > config.max_decoded_pixels {
        return Err(TileError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

/// 通过文件签名校验输入是否为图片。
pub(crate) fn validate_image_signature(bytes: &[u8]) -> Result<(), TileError> {
    if bytes.is_empty() {
        return Err(TileError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| TileError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(TileError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 255) as u8, (y % 255) as u8, 9]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn raw(bytes: Vec<u8>) -> RawImageData {
        RawImageData {
            bytes,
            source_hint: "test",
        }
    }

    #[test]
    fn decodes_png_with_dimensions_and_channels() {
        let image = decode_raw_image(raw(png_bytes(40, 25)), Reference::Blank, &TilerConfig::default())
            .expect("decode should succeed");

        assert_eq!((image.width, image.height, image.channels), (40, 25, 3));
    }

    #[test]
    fn rejects_non_image_payload() {
        let result = decode_raw_image(
            raw(b"<html><body>not an image</body></html>".to_vec()),
            Reference::Blank,
            &TilerConfig::default(),
        );

        assert!(matches!(result, Err(TileError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_truncated_png() {
        let mut bytes = png_bytes(16, 16);
        bytes.truncate(40);

        let result = decode_raw_image(raw(bytes), Reference::Blank, &TilerConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn rejects_too_many_pixels_before_decode() {
        let config = TilerConfig {
            max_decoded_pixels: 100,
            ..TilerConfig::default()
        };

        let result = decode_raw_image(raw(png_bytes(20, 20)), Reference::Blank, &config);
        assert!(matches!(result, Err(TileError::ResourceLimit(_))));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            validate_image_signature(&[]),
            Err(TileError::InvalidFormat(_))
        ));
    }
}
