use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, SerializableHandle};

fn serialize_with_scope(node: &Handle, traversal_scope: TraversalScope) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope,
        ..Default::default()
    };

    // 写入 Vec<u8> 不会产生 IO 错误
    if let Err(err) = serialize(&mut buf, &serializable, opts) {
        tracing::warn!("序列化节点失败: {}", err);
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// 序列化节点自身及其子树（等价于 `outerHTML`）
pub fn outer_html(node: &Handle) -> String {
    serialize_with_scope(node, TraversalScope::IncludeNode)
}

/// 只序列化子节点（等价于 `innerHTML`）
pub fn inner_html(node: &Handle) -> String {
    serialize_with_scope(node, TraversalScope::ChildrenOnly(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::{append, create_element, create_text};

    #[test]
    fn outer_and_inner() {
        let p = create_element("p", &[("id", "x")]);
        let b = create_element("b", &[]);
        append(&b, create_text("world"));
        append(&p, create_text("Hello "));
        append(&p, b);

        assert_eq!(inner_html(&p), "Hello <b>world</b>");
        assert_eq!(outer_html(&p), "<p id=\"x\">Hello <b>world</b></p>");
    }

    #[test]
    fn text_is_escaped() {
        let p = create_element("p", &[]);
        append(&p, create_text("a < b & c"));
        assert_eq!(inner_html(&p), "a &lt; b &amp; c");
    }
}
