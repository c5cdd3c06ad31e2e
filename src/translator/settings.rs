//! 持久化的用户偏好
//!
//! 只保存控制面板能修改的三项：是否启用、输出模式和译文样式。
//! 读取失败时回退到默认值，缺失字段用默认值补齐。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::translator::config::constants::SETTINGS_PATH;
use crate::translator::config::{DisplayMode, Rule, TextStyle};
use crate::translator::error::TranslatorResult;

/// 用户偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredSettings {
    pub enabled: bool,
    pub display_mode: DisplayMode,
    pub text_style: TextStyle,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            display_mode: DisplayMode::Overlay,
            text_style: TextStyle::Fuzzy,
        }
    }
}

impl StoredSettings {
    /// 把偏好写入规则
    pub fn apply_to(&self, rule: &mut Rule) {
        rule.display_mode = self.display_mode;
        rule.text_style = self.text_style;
    }

    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(display_mode) = patch.display_mode {
            self.display_mode = display_mode;
        }
        if let Some(text_style) = patch.text_style {
            self.text_style = text_style;
        }
    }
}

/// 部分更新
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub enabled: Option<bool>,
    pub display_mode: Option<DisplayMode>,
    pub text_style: Option<TextStyle>,
}

/// 基于 TOML 文件的偏好存储
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认位置 `~/.config/dom-translator/settings.toml`
    pub fn default_location() -> Self {
        Self::new(shellexpand::tilde(SETTINGS_PATH).into_owned())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取偏好，文件不存在或无法解析时返回默认值
    pub fn load(&self) -> StoredSettings {
        if !self.path.exists() {
            return StoredSettings::default();
        }
        match self.try_load() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::error!("读取用户偏好失败 {}: {}", self.path.display(), err);
                StoredSettings::default()
            }
        }
    }

    fn try_load(&self) -> TranslatorResult<StoredSettings> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    /// 合并部分更新并写回，返回更新后的偏好
    pub fn save(&self, patch: SettingsPatch) -> TranslatorResult<StoredSettings> {
        let mut settings = self.load();
        settings.merge(patch);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(&settings)?)?;
        tracing::info!("用户偏好已保存: {:?}", settings);
        Ok(settings)
    }
}
