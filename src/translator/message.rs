//! 控制消息
//!
//! 控制面板发来的消息以 JSON 表示，`type` 字段区分种类，
//! 每种消息对应引擎的一个生命周期操作。

use serde::{Deserialize, Serialize};

use crate::dom::SelectorList;
use crate::translator::config::{DisplayMode, RulePatch, TextStyle};
use crate::translator::error::TranslatorResult;
use crate::translator::lifecycle::DomTranslator;
use crate::translator::render::RenderTasks;
use crate::translator::settings::SettingsPatch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Enable,
    Disable,
    SetDisplayMode { mode: DisplayMode },
    ToggleStyle,
    TranslateAll,
    TranslateElement { selector: String },
}

impl ControlMessage {
    pub fn from_json(json: &str) -> TranslatorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 需要持久化的偏好变化
    pub fn settings_patch(&self) -> Option<SettingsPatch> {
        match self {
            ControlMessage::Enable => Some(SettingsPatch {
                enabled: Some(true),
                ..SettingsPatch::default()
            }),
            ControlMessage::Disable => Some(SettingsPatch {
                enabled: Some(false),
                ..SettingsPatch::default()
            }),
            ControlMessage::SetDisplayMode { mode } => Some(SettingsPatch {
                display_mode: Some(*mode),
                ..SettingsPatch::default()
            }),
            _ => None,
        }
    }
}

/// 消息处理结果
#[derive(Debug)]
pub enum MessageOutcome {
    Done,
    StyleChanged(TextStyle),
    Started(RenderTasks),
    /// 选择器没有匹配任何元素
    NoMatch,
}

impl MessageOutcome {
    pub fn into_tasks(self) -> Option<RenderTasks> {
        match self {
            MessageOutcome::Started(tasks) => Some(tasks),
            _ => None,
        }
    }
}

/// 把消息映射到引擎操作
pub fn dispatch(
    translator: &DomTranslator,
    message: ControlMessage,
) -> TranslatorResult<MessageOutcome> {
    tracing::debug!("收到控制消息: {:?}", message);

    match message {
        ControlMessage::Enable => {
            translator.register();
            Ok(MessageOutcome::Done)
        }
        ControlMessage::Disable => {
            translator.unregister();
            Ok(MessageOutcome::Done)
        }
        ControlMessage::SetDisplayMode { mode } => {
            translator.update_rule(RulePatch::display_mode(mode))?;
            Ok(MessageOutcome::Done)
        }
        ControlMessage::ToggleStyle => Ok(MessageOutcome::StyleChanged(translator.toggle_style())),
        ControlMessage::TranslateAll => Ok(MessageOutcome::Started(translator.translate_all())),
        ControlMessage::TranslateElement { selector } => {
            let list = SelectorList::parse(&selector)?;
            let document = translator.page().document();
            match list.query_all(&document).into_iter().next() {
                Some(node) => Ok(MessageOutcome::Started(RenderTasks::new(vec![
                    translator.render(&node),
                ]))),
                None => {
                    tracing::warn!("没有元素匹配 '{}'", selector);
                    Ok(MessageOutcome::NoMatch)
                }
            }
        }
    }
}
