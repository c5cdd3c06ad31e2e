//! HTML 解析
//!
//! 文档解析沿用 `html5ever::parse_document`，片段解析用于把占位符中保存的
//! 标记重新变成游离节点，而不是以原始字符串写回活动树。

use std::borrow::Cow;

use encoding_rs::Encoding;
use html5ever::interface::{
    Attribute, ElementFlags, ExpandedName, NextParserState, NodeOrText, QualName, QuirksMode,
    TreeSink,
};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, parse_document, parse_fragment as parse_html_fragment};
use html5ever::LocalName;
use markup5ever_rcdom::{Handle, RcDom};

use super::node::{get_child_node_by_name, take_children};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => {
            let (string, _, _) = encoding.decode(data);
            string.to_string()
        }
        None => String::from_utf8_lossy(data).to_string(),
    };

    parse_document(TemplateKeepingSink::default(), Default::default()).one(s)
}

/// 保留 `<template shadowrootmode>` 原样的解析接收器
///
/// `RcDom` 不支持声明式影子根，解析器会丢掉模板并把内容展开到宿主下。
/// 这里拒绝声明式影子根，模板及其 `template_contents` 留在树中，
/// 由 [`Page`](super::Page) 在构建时挂接。
#[derive(Default)]
struct TemplateKeepingSink(RcDom);

impl TreeSink for TemplateKeepingSink {
    type Handle = Handle;
    type Output = RcDom;
    type ElemName<'a> = ExpandedName<'a> where Self: 'a;

    fn finish(self) -> RcDom {
        self.0
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        self.0.parse_error(msg)
    }

    fn get_document(&self) -> Handle {
        self.0.get_document()
    }

    fn elem_name<'a>(&'a self, target: &'a Handle) -> ExpandedName<'a> {
        self.0.elem_name(target)
    }

    fn create_element(&self, name: QualName, attrs: Vec<Attribute>, flags: ElementFlags) -> Handle {
        self.0.create_element(name, attrs, flags)
    }

    fn create_comment(&self, text: StrTendril) -> Handle {
        self.0.create_comment(text)
    }

    fn create_pi(&self, target: StrTendril, data: StrTendril) -> Handle {
        self.0.create_pi(target, data)
    }

    fn append(&self, parent: &Handle, child: NodeOrText<Handle>) {
        self.0.append(parent, child)
    }

    fn append_based_on_parent_node(
        &self,
        element: &Handle,
        prev_element: &Handle,
        child: NodeOrText<Handle>,
    ) {
        self.0.append_based_on_parent_node(element, prev_element, child)
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    ) {
        self.0.append_doctype_to_document(name, public_id, system_id)
    }

    fn mark_script_already_started(&self, node: &Handle) {
        self.0.mark_script_already_started(node)
    }

    fn get_template_contents(&self, target: &Handle) -> Handle {
        self.0.get_template_contents(target)
    }

    fn same_node(&self, x: &Handle, y: &Handle) -> bool {
        self.0.same_node(x, y)
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        self.0.set_quirks_mode(mode)
    }

    fn append_before_sibling(&self, sibling: &Handle, new_node: NodeOrText<Handle>) {
        self.0.append_before_sibling(sibling, new_node)
    }

    fn add_attrs_if_missing(&self, target: &Handle, attrs: Vec<Attribute>) {
        self.0.add_attrs_if_missing(target, attrs)
    }

    fn remove_from_parent(&self, target: &Handle) {
        self.0.remove_from_parent(target)
    }

    fn reparent_children(&self, node: &Handle, new_parent: &Handle) {
        self.0.reparent_children(node, new_parent)
    }

    fn is_mathml_annotation_xml_integration_point(&self, handle: &Handle) -> bool {
        self.0.is_mathml_annotation_xml_integration_point(handle)
    }

    fn complete_script(&self, node: &Handle) -> NextParserState {
        self.0.complete_script(node)
    }

    fn allow_declarative_shadow_roots(&self, _intended_parent: &Handle) -> bool {
        false
    }
}

/// 在 `<body>` 上下文中解析标记片段，返回游离的顶层节点
pub fn parse_fragment(markup: &str) -> Vec<Handle> {
    if markup.is_empty() {
        return Vec::new();
    }

    let dom = parse_html_fragment(
        RcDom::default(),
        Default::default(),
        QualName::new(None, ns!(html), LocalName::from("body")),
        vec![],
    )
    .one(markup);

    // 片段解析的结果挂在 document > html 之下
    match get_child_node_by_name(&dom.document, "html") {
        Some(html) => take_children(&html),
        None => take_children(&dom.document),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::{descendant_elements, get_node_attr, get_node_name, text_content};
    use markup5ever_rcdom::NodeData;

    #[test]
    fn fragment_yields_detached_nodes() {
        let nodes = parse_fragment("Hi <b class=\"x\">there</b>!");

        assert_eq!(nodes.len(), 3);
        assert_eq!(get_node_name(&nodes[1]), Some("b"));
        assert_eq!(get_node_attr(&nodes[1], "class"), Some("x".to_string()));
        assert_eq!(text_content(&nodes[1]), "there");
        assert!(crate::dom::node::parent_of(&nodes[1]).is_none());
    }

    #[test]
    fn empty_fragment() {
        assert!(parse_fragment("").is_empty());
    }

    #[test]
    fn decodes_declared_charset() {
        let bytes = b"<html><head><title>caf\xe9</title></head></html>";
        let dom = html_to_dom(bytes, "windows-1252");
        assert!(text_content(&dom.document).contains("café"));
    }

    #[test]
    fn shadow_root_templates_stay_in_tree() {
        let dom = html_to_dom(
            b"<div id=host><template shadowrootmode=open><p>inside</p></template><span>light</span></div>",
            "utf-8",
        );
        let elements = descendant_elements(&dom.document);

        let template = elements
            .iter()
            .find(|el| get_node_name(el) == Some("template"))
            .expect("template kept");
        assert_eq!(get_node_attr(template, "shadowrootmode"), Some("open".to_string()));
        assert!(!elements.iter().any(|el| get_node_name(el) == Some("p")));

        let NodeData::Element {
            ref template_contents,
            ..
        } = template.data
        else {
            panic!("template is an element");
        };
        let contents = template_contents.borrow().clone().expect("template contents");
        assert_eq!(text_content(&contents), "inside");
    }
}
