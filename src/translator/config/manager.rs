//! 分层配置管理器
//!
//! 加载顺序：`.env` 文件 -> 配置文件（TOML 或 JSON）-> 环境变量覆盖 -> 验证。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use super::rule::Rule;
use super::setting::Setting;
use crate::translator::error::{TranslatorError, TranslatorResult};

/// 翻译后端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub api_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            source_lang: constants::DEFAULT_SOURCE_LANG.to_string(),
            target_lang: constants::DEFAULT_TARGET_LANG.to_string(),
            timeout_secs: constants::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> TranslatorResult<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(TranslatorError::Config(format!(
                "API URL 必须以 http:// 或 https:// 开头: {}",
                self.api_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(TranslatorError::Config("请求超时不能为0".to_string()));
        }
        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{backend, override_from};

        if let Some(api_url) = override_from::<backend::ApiUrl, _>() {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }
        if let Some(source_lang) = override_from::<backend::SourceLang, _>() {
            self.source_lang = source_lang;
        }
        if let Some(target_lang) = override_from::<backend::TargetLang, _>() {
            self.target_lang = target_lang;
        }
        if let Some(timeout) = override_from::<backend::Timeout, _>() {
            self.timeout_secs = timeout.as_secs();
        }
    }
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub rule: Rule,
    pub setting: Setting,
    pub backend: BackendConfig,
}

impl TranslatorConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslatorResult<()> {
        self.rule.validate()?;
        self.setting.validate()?;
        self.backend.validate()
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        self.setting.apply_env_overrides();
        self.backend.apply_env_overrides();
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslatorConfig,
    source: Option<String>,
}

impl ConfigManager {
    /// 按默认搜索路径加载配置
    pub fn new() -> TranslatorResult<Self> {
        Self::load_dotenv();

        let (mut config, source) = match Self::find_config_file() {
            Some(path) => {
                tracing::info!("加载配置文件: {}", path);
                (Self::load_from_file(&path)?, Some(path))
            }
            None => {
                tracing::info!("未找到配置文件，使用默认配置");
                (TranslatorConfig::default(), None)
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(Self { config, source })
    }

    /// 从指定文件加载配置
    pub fn from_file(path: &str) -> TranslatorResult<Self> {
        Self::load_dotenv();

        let expanded = shellexpand::tilde(path).into_owned();
        let mut config = Self::load_from_file(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(Self {
            config,
            source: Some(expanded),
        })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn into_config(self) -> TranslatorConfig {
        self.config
    }

    /// 配置来源文件，使用默认值时为 `None`
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn find_config_file() -> Option<String> {
        constants::CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists())
    }

    fn load_from_file(path: &str) -> TranslatorResult<TranslatorConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslatorError::Config(format!("读取配置文件失败 {}: {}", path, e)))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| TranslatorError::Config(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| TranslatorError::Config(format!("解析TOML配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslatorResult<()> {
        let content = toml::to_string_pretty(&TranslatorConfig::default())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::config::{DisplayMode, Trigger};

    #[test]
    fn partial_toml_fills_defaults() {
        let config: TranslatorConfig = toml::from_str(
            r#"
            [rule]
            selector = "article p"
            display_mode = "replace"
            trigger = "open"

            [setting]
            reflow_debounce_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.rule.selector, "article p");
        assert_eq!(config.rule.display_mode, DisplayMode::Replace);
        assert_eq!(config.rule.trigger, Trigger::Eager);
        assert_eq!(config.setting.reflow_debounce_ms, 50);
        assert_eq!(config.setting.host_tag, "x-kt-trans");
        assert_eq!(config.backend, BackendConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_config_is_accepted() {
        let config: TranslatorConfig =
            serde_json::from_str(r#"{"rule": {"selector": "li", "min_len": 1}}"#).unwrap();
        assert_eq!(config.rule.selector, "li");
        assert_eq!(config.rule.min_len, 1);
    }

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&TranslatorConfig::default()).unwrap();
        let back: TranslatorConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, TranslatorConfig::default());
    }

    #[test]
    fn invalid_backend_is_rejected() {
        let mut config = TranslatorConfig::default();
        config.backend.api_url = "localhost:1188".into();
        assert!(config.validate().is_err());
    }
}
