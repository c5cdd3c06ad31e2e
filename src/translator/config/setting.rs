//! 引擎参数

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translator::error::{TranslatorError, TranslatorResult};

/// 引擎参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Setting {
    /// 变更触发重扫描前的静默间隔（毫秒）
    pub reflow_debounce_ms: u64,
    /// 可见比例达到该值才算进入可见区域
    pub visible_threshold: f64,
    /// 永远不会成为候选的标签
    pub skip_tags: Vec<String>,
    /// 译文宿主元素的标签名
    pub host_tag: String,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            reflow_debounce_ms: constants::DEFAULT_REFLOW_DEBOUNCE.as_millis() as u64,
            visible_threshold: constants::DEFAULT_VISIBLE_THRESHOLD,
            skip_tags: constants::DEFAULT_SKIP_TAGS
                .iter()
                .map(|tag| tag.to_string())
                .collect(),
            host_tag: constants::DEFAULT_HOST_TAG.to_string(),
        }
    }
}

impl Setting {
    pub fn reflow_debounce(&self) -> Duration {
        Duration::from_millis(self.reflow_debounce_ms)
    }

    pub fn is_skipped(&self, tag: &str) -> bool {
        self.skip_tags.iter().any(|skip| skip.eq_ignore_ascii_case(tag))
    }

    /// 验证参数
    pub fn validate(&self) -> TranslatorResult<()> {
        if !is_custom_element_name(&self.host_tag) {
            return Err(TranslatorError::Config(format!(
                "宿主标签 '{}' 不是合法的自定义元素名（需小写且包含 '-'）",
                self.host_tag
            )));
        }

        if !(0.0..=1.0).contains(&self.visible_threshold) {
            return Err(TranslatorError::Config(format!(
                "可见阈值 {} 超出范围 [0, 1]",
                self.visible_threshold
            )));
        }

        if self.is_skipped(&self.host_tag) {
            return Err(TranslatorError::Config(format!(
                "宿主标签 '{}' 不能出现在跳过列表中",
                self.host_tag
            )));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{engine, override_from};

        if let Some(debounce) = override_from::<engine::ReflowDebounce, _>() {
            self.reflow_debounce_ms = debounce.as_millis() as u64;
        }
        if let Some(threshold) = override_from::<engine::VisibleThreshold, _>() {
            self.visible_threshold = threshold;
        }
        if let Some(skip_tags) = override_from::<engine::SkipTags, _>() {
            self.skip_tags = skip_tags;
        }
        if let Some(host_tag) = override_from::<engine::HostTag, _>() {
            tracing::info!("环境变量覆盖宿主标签: {}", host_tag);
            self.host_tag = host_tag;
        }
    }
}

fn is_custom_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_lower = chars.next().map(|c| c.is_ascii_lowercase()).unwrap_or(false);
    starts_lower
        && name.contains('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let setting = Setting::default();
        assert_eq!(setting.reflow_debounce(), Duration::from_millis(300));
        assert_eq!(setting.visible_threshold, 0.1);
        assert_eq!(setting.host_tag, "x-kt-trans");
        assert!(setting.is_skipped("SCRIPT"));
        assert!(setting.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_values() {
        let mut setting = Setting::default();
        setting.host_tag = "span".into();
        assert!(setting.validate().is_err());

        let mut setting = Setting::default();
        setting.host_tag = "X-Trans".into();
        assert!(setting.validate().is_err());

        let mut setting = Setting::default();
        setting.visible_threshold = 1.5;
        assert!(setting.validate().is_err());

        let mut setting = Setting::default();
        setting.skip_tags.push("x-kt-trans".into());
        assert!(setting.validate().is_err());
    }
}
