//! 页面内翻译引擎
//!
//! 这个模块负责把一棵持续变化的文档树与一组异步的逐节点翻译任务保持同步：
//!
//! - 选择候选节点（`targets`），受保护内容以占位符编码（`codec`）
//! - 调用翻译后端（`backend`），按请求令牌只接受最新结果（`render`）
//! - 可见、悬停、立即或手动触发，页面变化时防抖重扫描（`observer`）
//! - 注册、注销、规则更新与样式切换（`lifecycle`）
//!
//! 外围能力：用户偏好（`settings`）、控制消息（`message`）与划词翻译（`selection`）。

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod observer;
pub mod render;
pub mod selection;
pub mod settings;
pub mod style;
pub mod targets;

pub use backend::{FnTranslator, HttpTranslator, Translate};
pub use codec::{EncodedQuery, KeepSelector, PlaceholderCodec};
pub use config::{
    BackendConfig, ConfigManager, DisplayMode, HoverKey, Rule, RulePatch, Setting,
    TermDictionary, TextStyle, TranslatorConfig, Trigger,
};
pub use error::{ErrorCategory, TranslatorError, TranslatorResult};
pub use lifecycle::{DomTranslator, Hooks};
pub use message::{dispatch, ControlMessage, MessageOutcome};
pub use render::{EngineStats, RenderTasks, StatsSnapshot};
pub use selection::{SelectionOutcome, SelectionTranslator, SkipReason};
pub use settings::{SettingsPatch, SettingsStore, StoredSettings};
pub use targets::SelectorSpec;
