//! 环境变量
//!
//! 每个变量是一个实现 [`EnvVar`] 的零大小类型，名称、默认值和说明都是常量。
//! 配置加载时只有"已设置"的变量才会覆盖文件或默认值，
//! 设置了但无法解析的变量会记录警告并被忽略。

use std::time::Duration;

use thiserror::Error;

/// 环境变量读取错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("环境变量 {0} 未设置")]
    Missing(&'static str),

    #[error("环境变量 {variable} 无效: {reason}")]
    Invalid {
        variable: &'static str,
        reason: String,
    },
}

pub type EnvResult<T> = Result<T, EnvError>;

fn invalid<T>(variable: &'static str, reason: impl Into<String>) -> EnvResult<T> {
    Err(EnvError::Invalid {
        variable,
        reason: reason.into(),
    })
}

pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 只在变量被设置时返回解析结果
    fn lookup() -> Option<EnvResult<T>> {
        std::env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    /// 读取变量；未设置时返回默认值，没有默认值则报错
    fn get() -> EnvResult<T> {
        Self::lookup()
            .or_else(|| Self::DEFAULT.map(Ok))
            .unwrap_or(Err(EnvError::Missing(Self::NAME)))
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 读取已设置的变量，解析失败时记录警告
pub fn override_from<V, T>() -> Option<T>
where
    V: EnvVar<T>,
{
    V::lookup()?
        .map_err(|err| tracing::warn!("忽略无效的环境变量: {}", err))
        .ok()
}

/// 进程级变量
pub mod core {
    use super::*;

    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "DOM_TRANSLATOR_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            let level = value.trim().to_ascii_lowercase();
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(level),
                _ => invalid(Self::NAME, format!("未知的日志级别 '{}'", value)),
            }
        }
    }

    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // 任何非空值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }
}

/// 引擎参数
pub mod engine {
    use super::*;

    pub struct ReflowDebounce;
    impl EnvVar<Duration> for ReflowDebounce {
        const NAME: &'static str = "DOM_TRANSLATOR_REFLOW_DEBOUNCE_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(300));
        const DESCRIPTION: &'static str = "Quiet interval before a mutation-triggered rescan (ms)";

        fn parse(value: &str) -> EnvResult<Duration> {
            in_range(Self::NAME, value, 0, 60_000).map(Duration::from_millis)
        }
    }

    pub struct VisibleThreshold;
    impl EnvVar<f64> for VisibleThreshold {
        const NAME: &'static str = "DOM_TRANSLATOR_VISIBLE_THRESHOLD";
        const DEFAULT: Option<f64> = Some(0.1);
        const DESCRIPTION: &'static str = "Visible ratio (0.0 - 1.0) that triggers on-visible rendering";

        fn parse(value: &str) -> EnvResult<f64> {
            match value.trim().parse::<f64>() {
                Ok(ratio) if (0.0..=1.0).contains(&ratio) => Ok(ratio),
                Ok(ratio) => invalid(Self::NAME, format!("{} 不在 0.0 到 1.0 之间", ratio)),
                Err(_) => invalid(Self::NAME, format!("'{}' 不是数字", value)),
            }
        }
    }

    pub struct SkipTags;
    impl EnvVar<Vec<String>> for SkipTags {
        const NAME: &'static str = "DOM_TRANSLATOR_SKIP_TAGS";
        const DEFAULT: Option<Vec<String>> = None;
        const DESCRIPTION: &'static str = "Tag names never selected for translation (comma-separated)";

        fn parse(value: &str) -> EnvResult<Vec<String>> {
            Ok(value
                .split(',')
                .map(|tag| tag.trim().to_ascii_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect())
        }
    }

    pub struct HostTag;
    impl EnvVar<String> for HostTag {
        const NAME: &'static str = "DOM_TRANSLATOR_HOST_TAG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Custom element name used for injected translation output";

        fn parse(value: &str) -> EnvResult<String> {
            let tag = value.trim().to_ascii_lowercase();
            if tag.contains('-') {
                Ok(tag)
            } else {
                invalid(Self::NAME, "宿主标签必须是包含 '-' 的自定义元素名")
            }
        }
    }
}

/// 翻译后端
pub mod backend {
    use super::*;

    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "DOM_TRANSLATOR_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Translation API endpoint URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if ["http://", "https://"].iter().any(|scheme| url.starts_with(scheme)) {
                Ok(url.to_string())
            } else {
                invalid(Self::NAME, "必须以 http:// 或 https:// 开头")
            }
        }
    }

    pub struct SourceLang;
    impl EnvVar<String> for SourceLang {
        const NAME: &'static str = "DOM_TRANSLATOR_SOURCE_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Source language code sent to the translation API";

        fn parse(value: &str) -> EnvResult<String> {
            language_code(Self::NAME, value)
        }
    }

    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "DOM_TRANSLATOR_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language code sent to the translation API";

        fn parse(value: &str) -> EnvResult<String> {
            language_code(Self::NAME, value)
        }
    }

    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "DOM_TRANSLATOR_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(30));
        const DESCRIPTION: &'static str = "HTTP request timeout in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            in_range(Self::NAME, value, 1, 300).map(Duration::from_secs)
        }
    }
}

fn in_range(variable: &'static str, value: &str, min: u64, max: u64) -> EnvResult<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) if (min..=max).contains(&n) => Ok(n),
        Ok(n) => invalid(variable, format!("{} 超出范围 {}..={}", n, min, max)),
        Err(_) => invalid(variable, format!("'{}' 不是非负整数", value)),
    }
}

fn language_code(variable: &'static str, value: &str) -> EnvResult<String> {
    let code = value.trim();
    let well_formed = (2..=8).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if well_formed {
        Ok(code.to_string())
    } else {
        invalid(variable, format!("无效的语言代码 '{}'", value))
    }
}

/// 所有支持的变量及说明，供 `--list-env` 输出
pub fn describe_all() -> Vec<(&'static str, &'static str)> {
    vec![
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION),
        (core::NoColor::NAME, core::NoColor::DESCRIPTION),
        (engine::ReflowDebounce::NAME, engine::ReflowDebounce::DESCRIPTION),
        (engine::VisibleThreshold::NAME, engine::VisibleThreshold::DESCRIPTION),
        (engine::SkipTags::NAME, engine::SkipTags::DESCRIPTION),
        (engine::HostTag::NAME, engine::HostTag::DESCRIPTION),
        (backend::ApiUrl::NAME, backend::ApiUrl::DESCRIPTION),
        (backend::SourceLang::NAME, backend::SourceLang::DESCRIPTION),
        (backend::TargetLang::NAME, backend::TargetLang::DESCRIPTION),
        (backend::Timeout::NAME, backend::Timeout::DESCRIPTION),
    ]
}
