//! # 网格拼接模块
//!
//! ## 设计思路
//!
//! 纯函数，无 I/O：有序缩略图 + 版式 → 一张 RGBA 画布。
//! 格子按行优先排列，格子与行之间是透明间隔，末行不足时用空白格补齐。
//!
//! ## 实现思路
//!
//! 画布先整体填充空白像素，间隔与补齐格因此天然透明；
//! 随后逐个把缩略图贴到 `(col * (tile + spacing), row * (tile + spacing))`。

use std::borrow::Cow;

use image::RgbaImage;
use image::imageops;

use super::{GridSpec, TileError};
use super::normalize::fit_exact;
use super::source::{BLANK_PIXEL, Canvas, Thumbnail};

/// 末行需要补齐的空白格数量。
pub fn padding_for(count: usize, row_length: u32) -> usize {
    let row_length = row_length as usize;
    match count % row_length {
        0 => 0,
        remainder => row_length - remainder,
    }
}

/// 将缩略图拼成整张画布。
///
/// `thumbnails` 为空时返回高度为 0 的画布；版式非法或画布尺寸溢出时返回 `InvalidSpec`。
pub fn compose(thumbnails: &[Thumbnail], spec: &GridSpec) -> Result<Canvas, TileError> {
    spec.validate()?;

    let count = thumbnails.len();
    let rows = spec.rows_for(count);
    let width = spec.row_width();
    let height = spec.canvas_height(count)?;

    log::debug!(
        "🧱 拼接画布 - {} 张缩略图，{} 行 x {} 列，补齐 {} 格，尺寸 {}x{}",
        count,
        rows,
        spec.row_length,
        padding_for(count, spec.row_length),
        width,
        height
    );

    let mut canvas = RgbaImage::from_pixel(width, height, BLANK_PIXEL);
    let stride = spec.tile_size as i64 + spec.spacing as i64;
    let row_length = spec.row_length as usize;

    for (index, thumbnail) in thumbnails.iter().enumerate() {
        let tile = exact_tile(thumbnail, spec.tile_size);
        let x = (index % row_length) as i64 * stride;
        let y = (index / row_length) as i64 * stride;
        imageops::replace(&mut canvas, tile.as_ref(), x, y);
    }

    Ok(Canvas::new(canvas))
}

fn exact_tile(thumbnail: &Thumbnail, tile_size: u32) -> Cow<'_, RgbaImage> {
    if thumbnail.side() == tile_size {
        return Cow::Borrowed(thumbnail.pixels());
    }

    log::warn!(
        "⚠️ 缩略图边长 {} 与版式 {} 不一致，强制规整",
        thumbnail.side(),
        tile_size
    );
    Cow::Owned(fit_exact(thumbnail.pixels(), tile_size))
}
