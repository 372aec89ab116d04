//! # 拼图模块（tiler）
//!
//! ## 设计思路
//!
//! 该模块将“来源识别 → 加载 → 解码 → 规整为缩略图 → 拼接画布”
//! 按职责拆分为多个子模块：
//!
//! - `transport`：URL / 本地文件的字节获取（可注入）
//! - `resolver`：来源 → 原始字节 / 像素，失败统一为 `Unavailable`
//! - `pipeline`：签名校验、像素上限、解码
//! - `normalize`：缩放 + 居中裁剪 + 精确补齐
//! - `compose`：行优先网格拼接
//! - `handler`：并发编排 + 阶段耗时日志
//! - `service`：可取消的长生命周期入口
//! - `config/error/source/cancel`：配置、错误、中间数据模型、取消信号
//!
//! ## 调用链
//!
//! ```text
//! TileServiceState::tile_with_request_id
//!    ↓
//! TileHandler（校验版式 → 并发处理 → 拼接）
//!    ├─ resolver.rs（来源加载）
//!    ├─ pipeline.rs（解码 + 像素限制）
//!    ├─ normalize.rs（缩略图规整）
//!    └─ compose.rs（画布拼接）
//!    ↓
//! Canvas + TileReport
//! ```
//!
//! # 示例
//! ```rust
//! use image_tiler::tiler::{GridSpec, blank_tile, compose};
//!
//! let spec = GridSpec::new(136, 2, 4)?;
//! let tiles = vec![blank_tile(136), blank_tile(136), blank_tile(136)];
//! let canvas = compose(&tiles, &spec)?;
//! assert_eq!((canvas.width(), canvas.height()), (276, 276));
//! # Ok::<(), image_tiler::tiler::TileError>(())
//! ```

mod cancel;
mod compose;
mod config;
mod error;
mod handler;
mod normalize;
mod pipeline;
mod resolver;
mod service;
mod source;
mod transport;

pub use cancel::CancelSignal;
pub use compose::{compose, padding_for};
pub use config::{GridSpec, TilePerformanceProfile, TilerConfig};
pub use error::TileError;
pub use handler::{
    CellOutcome,
    CellStatus,
    TileAdvancedConfig,
    TileHandler,
    TileProgress,
    TileReport,
    TiledGrid,
};
pub use normalize::{blank_tile, crop_square, fit_exact, normalize};
pub use resolver::{SourceResolver, Unavailable};
pub use service::TileServiceState;
pub use source::{BLANK_PIXEL, BLANK_SENTINEL, Canvas, RawImage, Reference, Thumbnail};
pub use transport::{Fetch, FetchError, HttpFetcher, LocalFiles, OpenError, OpenFile};
