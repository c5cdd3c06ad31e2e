//! 划词翻译
//!
//! 对用户选中的一段文本单独翻译。每次请求分配递增编号，
//! `reset()`（按下鼠标或清空选区）使进行中的请求失效，只返回最新请求的结果。

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::dom::node::{get_node_attr, get_node_name, parent_of};
use crate::translator::backend::Translate;
use crate::translator::config::constants::MAX_SELECTION_LEN;
use crate::translator::error::TranslatorError;

/// 选区被跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    TooLong,
    NotEnglish,
    Editable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Empty => "选区为空",
            SkipReason::TooLong => "选区过长",
            SkipReason::NotEnglish => "不是英文文本",
            SkipReason::Editable => "选区位于可编辑区域",
        };
        f.write_str(reason)
    }
}

/// 划词翻译结果
#[derive(Debug)]
pub enum SelectionOutcome {
    Translated { request_id: u64, text: String },
    Skipped(SkipReason),
    /// 等待期间有更新的请求或被重置
    Superseded,
    Failed(TranslatorError),
}

pub struct SelectionTranslator {
    backend: Rc<dyn Translate>,
    active_request: Cell<u64>,
}

impl SelectionTranslator {
    pub fn new<T: Translate + 'static>(backend: T) -> Self {
        Self::from_shared(Rc::new(backend))
    }

    pub fn from_shared(backend: Rc<dyn Translate>) -> Self {
        Self {
            backend,
            active_request: Cell::new(0),
        }
    }

    /// 使进行中的请求失效
    pub fn reset(&self) {
        self.active_request.set(self.active_request.get() + 1);
        tracing::debug!("划词请求已重置");
    }

    /// 检查选区是否值得翻译，返回裁剪后的文本
    pub fn check(text: &str, anchor: Option<&Handle>) -> Result<String, SkipReason> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SkipReason::Empty);
        }
        if text.chars().count() > MAX_SELECTION_LEN {
            return Err(SkipReason::TooLong);
        }
        if !is_english(text) {
            return Err(SkipReason::NotEnglish);
        }
        if anchor.is_some_and(is_in_editable) {
            return Err(SkipReason::Editable);
        }
        Ok(text.to_string())
    }

    pub async fn translate_selection(&self, text: &str, anchor: Option<&Handle>) -> SelectionOutcome {
        let text = match Self::check(text, anchor) {
            Ok(text) => text,
            Err(reason) => {
                tracing::debug!("跳过划词翻译: {}", reason);
                return SelectionOutcome::Skipped(reason);
            }
        };

        let request_id = self.active_request.get() + 1;
        self.active_request.set(request_id);
        tracing::debug!("划词翻译请求 #{}", request_id);

        match self.backend.translate(&text).await {
            Ok(_) if self.active_request.get() != request_id => SelectionOutcome::Superseded,
            Ok(translated) => SelectionOutcome::Translated {
                request_id,
                text: translated,
            },
            Err(err) => {
                tracing::warn!("划词翻译失败: {}", err);
                SelectionOutcome::Failed(err)
            }
        }
    }
}

/// 可打印 ASCII 且至少包含一个拉丁字母
fn is_english(text: &str) -> bool {
    text.chars().all(|c| (' '..='~').contains(&c)) && text.chars().any(|c| c.is_ascii_alphabetic())
}

fn is_in_editable(node: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if let Some(tag) = get_node_name(&n) {
            if matches!(tag, "input" | "textarea")
                || get_node_attr(&n, "role").as_deref() == Some("textbox")
            {
                return true;
            }
            match get_node_attr(&n, "contenteditable").as_deref() {
                Some("false") => return false,
                Some(_) => return true,
                None => {}
            }
        }
        current = parent_of(&n);
    }
    false
}
