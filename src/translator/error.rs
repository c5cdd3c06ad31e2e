//! 翻译引擎统一错误处理
//!
//! 公开操作中只有构造和规则更新会返回错误；渲染、注册、注销内部的失败
//! 一律记录日志后吞掉，不会越过操作边界。

use thiserror::Error;

use crate::dom::DomError;

/// 翻译引擎错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslatorError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 选择器错误
    #[error("选择器错误: {0}")]
    Selector(String),

    /// 翻译服务拒绝了请求
    #[error("翻译服务错误: {0}")]
    Translation(String),

    /// 翻译服务返回了空结果
    #[error("翻译结果为空")]
    EmptyTranslation,

    /// 网络错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(String),

    /// DOM 操作错误
    #[error("DOM错误: {0}")]
    Dom(#[from] DomError),
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Service,
    Network,
    Serialization,
    Io,
    Dom,
}

impl TranslatorError {
    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslatorError::Config(_) | TranslatorError::Selector(_) => {
                ErrorCategory::Configuration
            }
            TranslatorError::Translation(_) | TranslatorError::EmptyTranslation => {
                ErrorCategory::Service
            }
            TranslatorError::Network(_) => ErrorCategory::Network,
            TranslatorError::Serialization(_) => ErrorCategory::Serialization,
            TranslatorError::Io(_) => ErrorCategory::Io,
            TranslatorError::Dom(_) => ErrorCategory::Dom,
        }
    }

    /// 检查错误是否可重试
    ///
    /// 引擎本身从不重试，这里供宿主决定是否再次触发渲染。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslatorError::Network(_) => true,
            TranslatorError::Translation(_) => true,
            TranslatorError::EmptyTranslation => false,
            TranslatorError::Config(_) => false,
            TranslatorError::Selector(_) => false,
            TranslatorError::Serialization(_) => false,
            TranslatorError::Io(_) => false,
            TranslatorError::Dom(_) => false,
        }
    }
}

impl From<std::io::Error> for TranslatorError {
    fn from(error: std::io::Error) -> Self {
        TranslatorError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for TranslatorError {
    fn from(error: serde_json::Error) -> Self {
        TranslatorError::Serialization(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslatorError {
    fn from(error: toml::de::Error) -> Self {
        TranslatorError::Config(format!("TOML解析错误: {}", error))
    }
}

impl From<toml::ser::Error> for TranslatorError {
    fn from(error: toml::ser::Error) -> Self {
        TranslatorError::Serialization(format!("TOML序列化错误: {}", error))
    }
}

impl From<reqwest::Error> for TranslatorError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            TranslatorError::Serialization(format!("响应解析失败: {}", error))
        } else {
            TranslatorError::Network(error.to_string())
        }
    }
}

/// 错误结果类型别名
pub type TranslatorResult<T> = Result<T, TranslatorError>;
