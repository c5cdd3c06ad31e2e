//! 翻译规则

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::constants;
use crate::translator::codec::{KeepSelector, PlaceholderCodec};
use crate::translator::error::{TranslatorError, TranslatorResult};
use crate::translator::targets::SelectorSpec;

/// 输出模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// 保留原文，译文追加在宿主元素中
    #[default]
    Overlay,
    /// 用译文替换原文，保留快照以便恢复
    Replace,
}

/// 触发策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// 注册后立即渲染
    #[serde(alias = "open")]
    Eager,
    /// 首次进入可见区域时渲染
    #[default]
    #[serde(alias = "scroll")]
    OnVisible,
    /// 首次指针进入时渲染
    #[serde(alias = "hover")]
    OnHover,
    /// 只响应显式请求
    Manual,
}

/// 悬停触发所需的修饰键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoverKey {
    Alt,
    Ctrl,
    Shift,
}

/// 译文展示样式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStyle {
    #[default]
    Fuzzy,
    Dashline,
}

impl TextStyle {
    pub fn toggled(self) -> Self {
        match self {
            TextStyle::Fuzzy => TextStyle::Dashline,
            TextStyle::Dashline => TextStyle::Fuzzy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextStyle::Fuzzy => "fuzzy",
            TextStyle::Dashline => "dashline",
        }
    }
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Overlay => "overlay",
            DisplayMode::Replace => "replace",
        }
    }
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Eager => "eager",
            Trigger::OnVisible => "on-visible",
            Trigger::OnHover => "on-hover",
            Trigger::Manual => "manual",
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TextStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = TranslatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "overlay" => Ok(DisplayMode::Overlay),
            "replace" => Ok(DisplayMode::Replace),
            other => Err(TranslatorError::Config(format!(
                "未知的输出模式 '{}'，可选: overlay, replace",
                other
            ))),
        }
    }
}

impl FromStr for Trigger {
    type Err = TranslatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eager" | "open" => Ok(Trigger::Eager),
            "on-visible" | "scroll" => Ok(Trigger::OnVisible),
            "on-hover" | "hover" => Ok(Trigger::OnHover),
            "manual" => Ok(Trigger::Manual),
            other => Err(TranslatorError::Config(format!(
                "未知的触发策略 '{}'，可选: eager, on-visible, on-hover, manual",
                other
            ))),
        }
    }
}

impl FromStr for HoverKey {
    type Err = TranslatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alt" => Ok(HoverKey::Alt),
            "ctrl" => Ok(HoverKey::Ctrl),
            "shift" => Ok(HoverKey::Shift),
            other => Err(TranslatorError::Config(format!(
                "未知的修饰键 '{}'，可选: alt, ctrl, shift",
                other
            ))),
        }
    }
}

impl FromStr for TextStyle {
    type Err = TranslatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fuzzy" => Ok(TextStyle::Fuzzy),
            "dashline" => Ok(TextStyle::Dashline),
            other => Err(TranslatorError::Config(format!(
                "未知的文本样式 '{}'，可选: fuzzy, dashline",
                other
            ))),
        }
    }
}

/// 术语表条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    /// 按字面匹配的原文
    pub pattern: String,
    /// 替换后的标记
    pub replacement: String,
}

/// 有序术语表
///
/// 文本格式为 `原文,替换` 条目，以换行、`;` 或 `；` 分隔。
/// 在配置文件中以同样的字符串形式出现。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TermDictionary {
    entries: Vec<TermEntry>,
}

impl TermDictionary {
    pub fn parse(source: &str) -> Self {
        let entries = source
            .split(|c: char| matches!(c, '\n' | ';' | '；'))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut parts = line.split(',').map(str::trim);
                let pattern = parts.next().unwrap_or_default();
                let replacement = parts.next().unwrap_or_default();
                if pattern.is_empty() {
                    return None;
                }
                Some(TermEntry {
                    pattern: pattern.to_string(),
                    replacement: replacement.to_string(),
                })
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[TermEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl From<String> for TermDictionary {
    fn from(source: String) -> Self {
        Self::parse(&source)
    }
}

impl From<TermDictionary> for String {
    fn from(dictionary: TermDictionary) -> Self {
        dictionary
            .entries
            .iter()
            .map(|entry| format!("{},{}", entry.pattern, entry.replacement))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 翻译规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// 候选选择器：`;` 分隔多个备选，`外层::shadow::内层` 进入影子根
    pub selector: String,
    /// 保护内容选择器：`直接匹配::shadow::包含匹配`，各部分以 `;` 分隔
    pub keep_selector: Option<String>,
    pub terms: TermDictionary,
    pub display_mode: DisplayMode,
    pub trigger: Trigger,
    pub hover_key: Option<HoverKey>,
    pub min_len: usize,
    pub max_len: usize,
    /// 注册期间追加到每个候选元素上的内联样式
    pub select_style: Option<String>,
    /// 注册期间追加到每个候选元素父元素上的内联样式
    pub parent_style: Option<String>,
    pub text_style: TextStyle,
    pub translate_title: bool,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            selector: constants::DEFAULT_SELECTOR.to_string(),
            keep_selector: Some(constants::DEFAULT_KEEP_SELECTOR.to_string()),
            terms: TermDictionary::default(),
            display_mode: DisplayMode::default(),
            trigger: Trigger::default(),
            hover_key: None,
            min_len: constants::DEFAULT_MIN_LEN,
            max_len: constants::DEFAULT_MAX_LEN,
            select_style: None,
            parent_style: None,
            text_style: TextStyle::default(),
            translate_title: false,
        }
    }
}

impl Rule {
    /// 以指定选择器创建，其余字段取默认值
    pub fn with_selector(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            ..Self::default()
        }
    }

    /// 验证规则
    pub fn validate(&self) -> TranslatorResult<()> {
        self.compile()?;

        if self.max_len == 0 {
            return Err(TranslatorError::Config("max_len 必须大于0".to_string()));
        }
        if self.min_len > self.max_len {
            return Err(TranslatorError::Config(format!(
                "min_len ({}) 不能大于 max_len ({})",
                self.min_len, self.max_len
            )));
        }

        Ok(())
    }

    /// 把选择器和术语表编译为类型化描述
    pub fn compile(&self) -> TranslatorResult<CompiledRule> {
        let selector = SelectorSpec::parse(&self.selector)?;
        let keep = KeepSelector::parse(self.keep_selector.as_deref().unwrap_or(""))?;
        let codec = PlaceholderCodec::new(keep, &self.terms)?;
        Ok(CompiledRule { selector, codec })
    }

    /// 合并补丁；字符串类可选字段传空串表示清除
    pub fn merge(&mut self, patch: RulePatch) {
        let RulePatch {
            selector,
            keep_selector,
            terms,
            display_mode,
            trigger,
            hover_key,
            min_len,
            max_len,
            select_style,
            parent_style,
            text_style,
            translate_title,
        } = patch;

        if let Some(selector) = selector {
            self.selector = selector;
        }
        if let Some(keep_selector) = keep_selector {
            self.keep_selector = non_empty(keep_selector);
        }
        if let Some(terms) = terms {
            self.terms = terms;
        }
        if let Some(display_mode) = display_mode {
            self.display_mode = display_mode;
        }
        if let Some(trigger) = trigger {
            self.trigger = trigger;
        }
        if let Some(hover_key) = hover_key {
            self.hover_key = hover_key;
        }
        if let Some(min_len) = min_len {
            self.min_len = min_len;
        }
        if let Some(max_len) = max_len {
            self.max_len = max_len;
        }
        if let Some(select_style) = select_style {
            self.select_style = non_empty(select_style);
        }
        if let Some(parent_style) = parent_style {
            self.parent_style = non_empty(parent_style);
        }
        if let Some(text_style) = text_style {
            self.text_style = text_style;
        }
        if let Some(translate_title) = translate_title {
            self.translate_title = translate_title;
        }
    }
}

/// 规则中需要解析的部分，规则变更时编译一次
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub selector: SelectorSpec,
    pub codec: PlaceholderCodec,
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// 规则补丁，所有字段可选
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePatch {
    pub selector: Option<String>,
    pub keep_selector: Option<String>,
    pub terms: Option<TermDictionary>,
    pub display_mode: Option<DisplayMode>,
    pub trigger: Option<Trigger>,
    /// `Some(None)` 清除修饰键；JSON 中写作 `null`
    #[serde(
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub hover_key: Option<Option<HoverKey>>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub select_style: Option<String>,
    pub parent_style: Option<String>,
    pub text_style: Option<TextStyle>,
    pub translate_title: Option<bool>,
}

impl RulePatch {
    pub fn display_mode(mode: DisplayMode) -> Self {
        Self {
            display_mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// 字段出现即为 `Some`，显式的 `null` 解析为 `Some(None)`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
