//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 库内部使用 `TileError` 描述拼图链路的错误；
//! 命令行入口还需要处理输出文件写入与 PNG 编码，因此在 crate 根部定义 `AppError` 统一收口。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `TileError` / `io::Error` / `ImageError` 提供 `From` 转换，`?` 即可传播。
//! - 实现 `Serialize` 将错误序列化为字符串，便于写入 JSON 报告。

use serde::Serialize;

use crate::tiler::TileError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 拼图流水线错误（参数 / 取消）
    #[error("{0}")]
    Tile(#[from] TileError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// PNG 编码或写出失败
    #[error("图片编码失败: {0}")]
    Encode(#[from] image::ImageError),

    /// 报告序列化失败
    #[error("报告序列化失败: {0}")]
    Report(#[from] serde_json::Error),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_error_keeps_its_message() {
        let err: AppError = TileError::InvalidSpec("tile_size 必须大于 0".to_string()).into();
        assert_eq!(err.to_string(), "参数错误：tile_size 必须大于 0");
    }

    #[test]
    fn serializes_as_display_string() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "out.png").into();
        let json = serde_json::to_string(&err).expect("serialize error");
        assert_eq!(json, "\"文件系统错误: out.png\"");
    }
}
