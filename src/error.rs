//! 统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use thiserror::Error;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 词典载入错误
    #[error("词典载入错误 ({locale}): {message}")]
    GlossaryError { locale: String, message: String },

    /// 缓存错误
    #[error("缓存错误: {0}")]
    CacheError(String),

    /// 翻译通道错误
    #[error("翻译通道错误: {0}")]
    WorkerError(String),

    /// 文档解析错误
    #[error("文档解析错误: {0}")]
    ParseError(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON 序列化错误
    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl EngineError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::WorkerError(_) => true,
            EngineError::CacheError(_) => true,
            EngineError::ConfigError(_) => false,
            EngineError::GlossaryError { .. } => false,
            EngineError::ParseError(_) => false,
            EngineError::IoError(_) => false,
            EngineError::JsonError(_) => false,
            EngineError::InternalError(_) => false,
        }
    }
}

/// 引擎操作的结果类型
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_errors_are_retryable() {
        assert!(EngineError::WorkerError("通道已关闭".to_string()).is_retryable());
        assert!(!EngineError::ConfigError("缺少词典目录".to_string()).is_retryable());
    }
}
