//! 展示样式注入
//!
//! 每个树根（主文档或影子根）各注入一次 `<style data-kt-trans-css="1">`。

use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::dom::node::{
    append, create_element, create_text, descendant_elements, get_node_attr, get_node_name,
};
use crate::dom::Page;
use crate::translator::config::constants::{
    DOCUMENT_STYLE_ID, HOST_STYLE_ATTR, STYLE_MARKER_ATTR, TERM_CLASS,
};

/// 宿主元素与术语的样式表
pub fn stylesheet(host_tag: &str) -> String {
    format!(
        "{host} {{ display: block; margin-top: 0.25em; line-height: inherit; }}\n\
         {host}[{attr}=\"fuzzy\"] {{ filter: blur(0.2px); opacity: 0.92; }}\n\
         {host}[{attr}=\"dashline\"] {{ border-top: 1px dashed currentColor; padding-top: 0.25em; }}\n\
         .{term} {{ font-style: normal; font-weight: 600; }}\n",
        host = host_tag,
        attr = HOST_STYLE_ATTR,
        term = TERM_CLASS,
    )
}

/// 树根内是否已有注入的样式
pub fn has_styles(root: &Handle) -> bool {
    descendant_elements(root).iter().any(|el| {
        get_node_name(el) == Some("style")
            && (get_node_attr(el, STYLE_MARKER_ATTR).is_some()
                || get_node_attr(el, "id").as_deref() == Some(DOCUMENT_STYLE_ID))
    })
}

/// 确保 `root` 中存在样式表，返回本次是否新注入
///
/// 主文档的样式放入 `<head>`，影子根的样式直接追加到根下。
pub fn ensure_styles(page: &Page, root: &Handle, host_tag: &str) -> bool {
    if has_styles(root) {
        return false;
    }

    let is_document = Rc::ptr_eq(root, &page.document());
    let (parent, attributes): (Handle, Vec<(&str, &str)>) = if is_document {
        let Some(head) = page.head() else {
            tracing::debug!("文档没有 <head>，跳过样式注入");
            return false;
        };
        (head, vec![(STYLE_MARKER_ATTR, "1"), ("id", DOCUMENT_STYLE_ID)])
    } else {
        (root.clone(), vec![(STYLE_MARKER_ATTR, "1")])
    };

    let style = create_element("style", &attributes);
    append(&style, create_text(&stylesheet(host_tag)));
    page.internal_write(|| page.append_child(&parent, style));
    tracing::debug!("已注入展示样式");
    true
}
