//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载拼图链路中的所有错误来源。
//! 单张图片的失败（网络、解码、超时等）只在内部流转，最终降级为空白格；
//! 真正向调用方返回的只有参数校验失败与取消。
//!
//! `code()` / `stage()` 提供稳定的机器可读标识，供报告与日志聚合使用。

/// 拼图处理统一错误类型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    #[error("参数错误：{0}")]
    InvalidSpec(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("已取消：{0}")]
    Cancelled(String),
}

impl TileError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSpec(_) => "E_INVALID_SPEC",
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Cancelled(_) => "E_CANCELLED",
        }
    }

    /// 出错所处阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidSpec(_) => "validate",
            Self::Network(_) | Self::Timeout(_) | Self::FileSystem(_) => "load",
            Self::Decode(_) | Self::InvalidFormat(_) | Self::ResourceLimit(_) => "decode",
            Self::Cancelled(_) => "cancel",
        }
    }
}
