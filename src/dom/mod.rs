//! 活动文档模型
//!
//! 这个模块在 `markup5ever_rcdom` 树之上提供引擎需要的"活页面"能力：
//!
//! - `node`: 基础节点读写、遍历和克隆
//! - `parser`: 文档与片段解析
//! - `serializer`: outerHTML / innerHTML 序列化
//! - `selector`: 基于 `cssparser` 的选择器子集
//! - `observer`: 变更观察者、可见性观察者与指针事件
//! - `page`: 页面本身，所有需要被观察到的写操作都从这里经过

pub mod node;
pub mod observer;
pub mod page;
pub mod parser;
pub mod selector;
pub mod serializer;

use thiserror::Error;

/// DOM 层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// 选择器语法错误
    #[error("无效的选择器 '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// 同一宿主元素重复挂载影子根
    #[error("元素 <{0}> 已经挂载了影子根")]
    ShadowRootExists(String),

    /// 只有元素节点才能挂载影子根
    #[error("只有元素节点才能挂载影子根")]
    NotAnElement,
}

pub use node::{
    contains, create_element, create_text, get_node_attr, get_node_name, set_node_attr,
    text_content, NodeKey,
};
pub use observer::{
    IntersectionEntry, IntersectionObserver, Listener, ListenerId, Modifiers, MutationObserver,
    MutationRecord, ObserverReceiver, PointerEvent, PointerEventKind,
};
pub use page::{Page, RootDiscovery};
pub use parser::{html_to_dom, parse_fragment};
pub use selector::SelectorList;
pub use serializer::{inner_html, outer_html};
