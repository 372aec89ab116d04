//! # 图片拼图工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  命令行 (main.rs, clap)                   │
//! │   参数解析 → TileServiceState → PNG 写出 / JSON 报告      │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            库 (Rust)                             │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  └─ tiler                                                │
//! │      ├─ transport   URL / 本地文件字节获取 (可注入)        │
//! │      ├─ resolver    来源 → 像素，失败为 Unavailable        │
//! │      ├─ pipeline    签名校验 · 像素上限 · 解码             │
//! │      ├─ normalize   缩放 · 居中裁剪 · 精确补齐             │
//! │      ├─ compose     行优先网格 + 透明间隔                  │
//! │      ├─ handler     并发编排 · 去重 · 取消 · 报告           │
//! │      └─ service     请求级取消入口                         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，命令行入口的返回类型 |
//! | [`tiler`] | 把一组图片来源拼成一张固定格子的 RGBA 画布 |

pub mod error;
pub mod tiler;
