//! # 缩略图规整模块
//!
//! ## 设计思路
//!
//! 任意尺寸、任意通道的源图都被强制规整为边长精确的 RGBA 正方形，
//! 本模块不做 I/O，也不返回错误。
//!
//! ## 实现思路
//!
//! 1. 转 RGBA（无 alpha 的源图 alpha 置 255）
//! 2. 等比缩小：目标长边 `floor(tile * max / min)`，只缩不放
//! 3. 居中裁成正方形，奇数差时向起始边偏 1 像素
//! 4. 精确尺寸兜底：不足处透明填充（前 `floor`、后 `ceil`），多余处截掉尾部
//!
//! 第 4 步是尺寸正确性的唯一保证，第 2 步的取整误差全部交给它处理。

use fast_image_resize as fr;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbaImage};

use super::TileError;
use super::source::{BLANK_PIXEL, RawImage, Thumbnail};

/// 完全透明的空白格。
pub fn blank_tile(tile_size: u32) -> Thumbnail {
    Thumbnail::from_exact(RgbaImage::from_pixel(tile_size, tile_size, BLANK_PIXEL))
}

/// 将源图规整为 `tile_size × tile_size` 的缩略图。
///
/// # 示例
/// ```rust
/// use image::{DynamicImage, RgbImage};
/// use image::imageops::FilterType;
/// use image_tiler::tiler::{RawImage, Reference, normalize};
///
/// let raw = RawImage::new(DynamicImage::ImageRgb8(RgbImage::new(640, 480)), Reference::Blank);
/// let thumb = normalize(&raw, 136, FilterType::Lanczos3);
/// assert_eq!(thumb.side(), 136);
/// ```
pub fn normalize(image: &RawImage, tile_size: u32, filter: FilterType) -> Thumbnail {
    if image.is_empty() || tile_size == 0 {
        return blank_tile(tile_size);
    }

    let rgba = image.pixels.to_rgba8();
    let scaled = downscale_to_cover(rgba, tile_size, filter);
    let cropped = crop_square(&scaled);

    Thumbnail::from_exact(fit_exact(&cropped, tile_size))
}

/// 缩放目标长边：`floor(tile_size * max(w, h) / min(w, h))`。
pub(crate) fn scale_target(width: u32, height: u32, tile_size: u32) -> u32 {
    let (larger, smaller) = (width.max(height) as u64, width.min(height).max(1) as u64);
    let target = tile_size as u64 * larger / smaller;
    target.min(u32::MAX as u64) as u32
}

/// 等比缩小，使裁切后的短边约等于 `tile_size`；源图足够小时原样返回。
fn downscale_to_cover(image: RgbaImage, tile_size: u32, filter: FilterType) -> RgbaImage {
    let (width, height) = image.dimensions();
    let target = scale_target(width, height, tile_size);

    if width.max(height) <= target {
        return image;
    }

    let (target_width, target_height) = if width >= height {
        (target, scaled_side(height, target, width))
    } else {
        (scaled_side(width, target, height), target)
    };

    log::trace!(
        "🧩 缩略图缩放：{}x{} -> {}x{}（filter={:?}）",
        width,
        height,
        target_width,
        target_height,
        filter
    );

    match resize_with_fast_image_resize(&image, target_width, target_height, filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ {}，回退 imageops::resize", err);
            imageops::resize(&image, target_width, target_height, filter)
        }
    }
}

/// `round(side * target / reference)`，至少为 1。
fn scaled_side(side: u32, target: u32, reference: u32) -> u32 {
    let (side, target, reference) = (side as u64, target as u64, reference as u64);
    let rounded = (2 * side * target + reference) / (2 * reference);
    rounded.clamp(1, u32::MAX as u64) as u32
}

fn resize_with_fast_image_resize(
    image: &RgbaImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<RgbaImage, TileError> {
    let (src_width, src_height) = image.dimensions();
    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, image.as_raw().clone(), fr::PixelType::U8x4)
            .map_err(|e| TileError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| TileError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| TileError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

/// 按短边居中裁成正方形，余数留在尾部。
pub fn crop_square(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let width_pad = (width - side) / 2;
    let height_pad = (height - side) / 2;

    imageops::crop_imm(image, width_pad, height_pad, side, side).to_image()
}

/// 每个轴独立处理：不足则透明填充（前 `floor(d/2)`，后 `ceil(d/2)`），超出则截掉尾部。
pub fn fit_exact(image: &RgbaImage, side: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == side && height == side {
        return image.clone();
    }

    let kept_width = width.min(side);
    let kept_height = height.min(side);
    let offset_x = (side - kept_width) / 2;
    let offset_y = (side - kept_height) / 2;

    let kept = imageops::crop_imm(image, 0, 0, kept_width, kept_height).to_image();
    let mut fitted = RgbaImage::from_pixel(side, side, BLANK_PIXEL);
    imageops::replace(&mut fitted, &kept, offset_x as i64, offset_y as i64);
    fitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiler::Reference;
    use image::{DynamicImage, Rgb, RgbImage, Rgba};
    use proptest::prelude::*;

    fn column_image(width: u32, height: u32) -> RgbaImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    fn raw(image: RgbaImage) -> RawImage {
        RawImage::new(DynamicImage::ImageRgba8(image), Reference::Blank)
    }

    #[test]
    fn blank_tile_is_transparent_white() {
        let tile = blank_tile(7);
        assert_eq!(tile.side(), 7);
        assert_eq!(tile.as_raw().len(), 7 * 7 * 4);
        assert!(tile.as_raw().chunks_exact(4).all(|px| px == [255, 255, 255, 0]));
    }

    #[test]
    fn fast_resize_returns_requested_dimensions() {
        let source = column_image(40, 20);
        let resized = resize_with_fast_image_resize(&source, 10, 5, FilterType::Lanczos3)
            .expect("fast resize should succeed");

        assert_eq!(resized.dimensions(), (10, 5));
    }

    #[test]
    fn scale_target_follows_aspect_ratio() {
        assert_eq!(scale_target(200, 100, 50), 100);
        assert_eq!(scale_target(100, 100, 50), 50);
        assert_eq!(scale_target(7, 3, 136), 317);
        assert_eq!(scale_target(1, 1, 136), 136);
    }

    #[test]
    fn crop_square_is_identity_on_square_input() {
        let image = column_image(9, 9);
        assert_eq!(crop_square(&image), image);
    }

    #[test]
    fn crop_square_biases_odd_difference_toward_leading_edge() {
        let cropped = crop_square(&column_image(6, 3));
        assert_eq!(cropped.dimensions(), (3, 3));
        let columns: Vec<u8> = (0..3).map(|x| cropped.get_pixel(x, 0)[0]).collect();
        assert_eq!(columns, vec![1, 2, 3]);

        let cropped = crop_square(&column_image(4, 9));
        let rows: Vec<u8> = (0..4).map(|y| cropped.get_pixel(0, y)[1]).collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);
    }

    #[test]
    fn fit_exact_pads_floor_leading_and_ceil_trailing() {
        let fitted = fit_exact(&RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255])), 4);
        assert_eq!(fitted.dimensions(), (4, 4));
        assert_eq!(*fitted.get_pixel(1, 1), Rgba([10, 20, 30, 255]));
        for (x, y, px) in fitted.enumerate_pixels() {
            if (x, y) != (1, 1) {
                assert_eq!(*px, BLANK_PIXEL);
            }
        }
    }

    #[test]
    fn fit_exact_truncates_trailing_excess() {
        let fitted = fit_exact(&column_image(6, 5), 4);
        assert_eq!(fitted.dimensions(), (4, 4));
        assert_eq!(fitted.get_pixel(0, 0)[0], 0);
        assert_eq!(fitted.get_pixel(3, 3)[0], 3);
        assert_eq!(fitted.get_pixel(3, 3)[1], 3);
    }

    #[test]
    fn fit_exact_handles_axes_independently() {
        let fitted = fit_exact(&column_image(6, 2), 4);
        // 宽度截尾，高度上下各补 1 行
        assert_eq!(*fitted.get_pixel(0, 0), BLANK_PIXEL);
        assert_eq!(fitted.get_pixel(3, 1)[0], 3);
        assert_eq!(*fitted.get_pixel(2, 3), BLANK_PIXEL);
    }

    #[test]
    fn rgb_source_becomes_opaque() {
        let rgb = RgbImage::from_pixel(12, 12, Rgb([5, 6, 7]));
        let thumb = normalize(
            &RawImage::new(DynamicImage::ImageRgb8(rgb), Reference::Blank),
            12,
            FilterType::Lanczos3,
        );
        assert!(thumb.pixels().pixels().all(|px| *px == Rgba([5, 6, 7, 255])));
    }

    #[test]
    fn wide_source_is_downscaled_then_cropped() {
        let image = RgbaImage::from_pixel(200, 100, Rgba([50, 60, 70, 255]));
        let thumb = normalize(&raw(image), 50, FilterType::Lanczos3);

        assert_eq!(thumb.side(), 50);
        assert!(thumb.pixels().pixels().all(|px| px[3] > 0));
    }

    #[test]
    fn small_source_is_padded_not_upscaled() {
        let thumb = normalize(&raw(RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255]))), 6, FilterType::Lanczos3);

        let opaque = thumb.pixels().pixels().filter(|px| px[3] == 255).count();
        assert_eq!(opaque, 4);
        assert_eq!(*thumb.pixels().get_pixel(2, 2), Rgba([1, 1, 1, 255]));
        assert_eq!(*thumb.pixels().get_pixel(0, 0), BLANK_PIXEL);
    }

    #[test]
    fn empty_source_degrades_to_blank() {
        let thumb = normalize(&raw(RgbaImage::new(0, 5)), 8, FilterType::Lanczos3);
        assert_eq!(thumb, blank_tile(8));
    }

    #[test]
    fn normalize_is_deterministic() {
        let image = column_image(123, 77);
        let first = normalize(&raw(image.clone()), 32, FilterType::Lanczos3);
        let second = normalize(&raw(image), 32, FilterType::Lanczos3);
        assert_eq!(first, second);
    }

    #[test]
    fn edge_sizes_around_tile_size_are_exact() {
        for (w, h) in [(1, 1), (135, 136), (137, 136), (136, 137), (136, 136), (1, 500), (2000, 3)] {
            let thumb = normalize(&raw(RgbaImage::new(w, h)), 136, FilterType::Triangle);
            assert_eq!(thumb.as_raw().len(), 136 * 136 * 4, "input {}x{}", w, h);
        }
    }

    proptest! {
        #[test]
        fn thumbnail_shape_is_always_exact(w in 1u32..300, h in 1u32..300, tile in 1u32..64) {
            let thumb = normalize(&raw(RgbaImage::new(w, h)), tile, FilterType::CatmullRom);
            prop_assert_eq!(thumb.side(), tile);
            prop_assert_eq!(thumb.as_raw().len(), (tile * tile * 4) as usize);
        }
    }
}
