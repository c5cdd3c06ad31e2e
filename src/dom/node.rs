//! 基础DOM节点操作
//!
//! 这里的函数直接读写 `markup5ever_rcdom` 树，不产生任何变更记录。
//! 需要被观察者感知的写操作请通过 [`crate::dom::Page`] 完成。

use std::cell::RefCell;
use std::rc::Rc;

use html5ever::interface::{Attribute, QualName};
use html5ever::tendril::{format_tendril, StrTendril};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData};

/// 节点身份标识
///
/// 基于 `Rc` 指针地址。只要仍有 `Handle` 或 `WeakHandle` 指向该节点，
/// 地址就不会被复用，因此持有弱引用的表项可以安全地以它为键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn of(node: &Handle) -> Self {
        NodeKey(Rc::as_ptr(node) as usize)
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 判断是否为元素节点
pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// 判断是否为文档类节点（主文档或影子根）
pub fn is_document(node: &Handle) -> bool {
    matches!(node.data, NodeData::Document)
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 设置节点属性，`None` 表示删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.clone() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value.as_str());
                } else {
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 在内联样式末尾追加声明
pub fn append_inline_style(node: &Handle, declarations: &str) {
    let declarations = declarations.trim();
    if declarations.is_empty() {
        return;
    }

    let style = match get_node_attr(node, "style") {
        Some(existing) if !existing.trim().is_empty() => {
            let existing = existing.trim_end();
            if existing.ends_with(';') {
                format!("{} {}", existing, declarations)
            } else {
                format!("{}; {}", existing, declarations)
            }
        }
        _ => declarations.to_string(),
    };
    set_node_attr(node, "style", Some(style));
}

/// 获取父节点
pub fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

/// 沿父链向上找到树的顶端节点
pub fn top_of(node: &Handle) -> Handle {
    let mut current = node.clone();
    while let Some(parent) = parent_of(&current) {
        current = parent;
    }
    current
}

/// `ancestor` 是否包含 `node`（包含自身，与 DOM `contains` 一致）
pub fn contains(ancestor: &Handle, node: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if Rc::ptr_eq(&n, ancestor) {
            return true;
        }
        current = parent_of(&n);
    }
    false
}

/// 从 `node` 开始（含自身）向上查找第一个满足条件的节点
pub fn closest<F>(node: &Handle, mut predicate: F) -> Option<Handle>
where
    F: FnMut(&Handle) -> bool,
{
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if predicate(&n) {
            return Some(n);
        }
        current = parent_of(&n);
    }
    None
}

/// 按文档顺序列出所有后代节点（不含自身，不进入 template 内容）
pub fn descendants(root: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    let mut stack: Vec<Handle> = root.children.borrow().iter().rev().cloned().collect();

    while let Some(node) = stack.pop() {
        for child in node.children.borrow().iter().rev() {
            stack.push(child.clone());
        }
        found.push(node);
    }

    found
}

/// 按文档顺序列出所有后代元素
pub fn descendant_elements(root: &Handle) -> Vec<Handle> {
    descendants(root).into_iter().filter(is_element).collect()
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    let matching_children = children.iter().find(|child| match child.data {
        NodeData::Element { ref name, .. } => &*name.local == node_name,
        _ => false,
    });
    matching_children.cloned()
}

/// 收集子树中的全部文本（等价于 DOM `textContent`）
pub fn text_content(node: &Handle) -> String {
    let mut text = String::new();
    collect_text(node, &mut text, false);
    text
}

/// 收集用户可见的文本，跳过脚本和样式内容
pub fn rendered_text(node: &Handle) -> String {
    let mut text = String::new();
    collect_text(node, &mut text, true);
    text
}

fn collect_text(node: &Handle, buf: &mut String, visible_only: bool) {
    match &node.data {
        NodeData::Text { contents } => buf.push_str(&contents.borrow()),
        NodeData::Element { name, .. } => {
            if visible_only && matches!(&*name.local, "script" | "style" | "noscript" | "template")
            {
                return;
            }
            for child in node.children.borrow().iter() {
                collect_text(child, buf, visible_only);
            }
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                collect_text(child, buf, visible_only);
            }
        }
        _ => {}
    }
}

/// 创建游离的 HTML 元素
pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: format_tendril!("{}", value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建游离的文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 创建空的文档类节点，用作影子根或片段容器
pub fn create_document_node() -> Handle {
    Node::new(NodeData::Document)
}

/// 深拷贝节点及其子树，返回游离的副本
pub fn deep_clone(node: &Handle) -> Handle {
    let copy = clone_node(node, true);
    for child in node.children.borrow().iter() {
        append(&copy, deep_clone(child));
    }
    copy
}

/// 只拷贝节点本身（属性、文本），不含子节点和 template 内容
pub fn shallow_clone(node: &Handle) -> Handle {
    clone_node(node, false)
}

fn clone_node(node: &Handle, with_template_contents: bool) -> Handle {
    let data = match &node.data {
        NodeData::Document => NodeData::Document,
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => NodeData::Doctype {
            name: name.clone(),
            public_id: public_id.clone(),
            system_id: system_id.clone(),
        },
        NodeData::Text { contents } => NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        },
        NodeData::Comment { contents } => NodeData::Comment {
            contents: contents.clone(),
        },
        NodeData::Element {
            name,
            attrs,
            template_contents,
            mathml_annotation_xml_integration_point,
        } => NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(if with_template_contents {
                template_contents.borrow().as_ref().map(deep_clone)
            } else {
                None
            }),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        },
        NodeData::ProcessingInstruction { target, contents } => {
            NodeData::ProcessingInstruction {
                target: target.clone(),
                contents: contents.clone(),
            }
        }
    };

    Node::new(data)
}

/// 从父节点上摘除
pub fn detach(node: &Handle) {
    if let Some(parent) = parent_of(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// 追加子节点（若已有父节点会先摘除）
pub fn append(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 在 `reference` 之前插入；`reference` 不是 `parent` 的子节点时退化为追加
pub fn insert_before(parent: &Handle, child: Handle, reference: &Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    match children.iter().position(|c| Rc::ptr_eq(c, reference)) {
        Some(index) => children.insert(index, child),
        None => children.push(child),
    }
}

/// 清空子节点并返回被移除的节点
pub fn take_children(parent: &Handle) -> Vec<Handle> {
    let removed: Vec<Handle> = parent.children.borrow_mut().drain(..).collect();
    for child in removed.iter() {
        child.parent.set(None);
    }
    removed
}
