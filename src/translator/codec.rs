//! 占位符编解码
//!
//! 编码：把元素的直接子节点拼成一行待翻译文本，受保护的子元素和术语
//! 替换为 `[i]` 占位符，对应的标记按序号保存。
//! 解码：把译文中的 `[i]` 还原为游离节点，序号越界时按字面文本保留。

use std::sync::OnceLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::{Captures, Regex};

use crate::dom::node::{
    append_inline_style, create_text, deep_clone, descendant_elements, get_node_attr,
    get_node_name, rendered_text, text_content,
};
use crate::dom::{outer_html, parse_fragment, Page, SelectorList};
use crate::translator::config::constants::TERM_CLASS;
use crate::translator::config::TermDictionary;
use crate::translator::error::{TranslatorError, TranslatorResult};
use crate::translator::targets::SHADOW_MARKER;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("placeholder pattern is valid"))
}

/// 保护内容选择器
///
/// 写法为 `直接匹配::shadow::包含匹配`，两部分各自以 `;` 分隔。
/// 子元素自身命中第一部分，或其后代命中第二部分时受保护；
/// 省略第二部分时以第一部分同时作为包含匹配。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepSelector {
    direct: Option<SelectorList>,
    contains: Option<SelectorList>,
}

impl KeepSelector {
    pub fn parse(spec: &str) -> TranslatorResult<Self> {
        let mut parts = spec.splitn(2, SHADOW_MARKER);
        let direct = parse_list(parts.next())?;
        let contains = match parts.next() {
            Some(part) => parse_list(Some(part))?,
            None => direct.clone(),
        };
        Ok(Self { direct, contains })
    }

    /// 不保护任何内容
    pub fn none() -> Self {
        Self::default()
    }

    pub fn protects(&self, element: &Handle) -> bool {
        self.direct.as_ref().is_some_and(|list| list.matches(element))
            || self
                .contains
                .as_ref()
                .is_some_and(|list| list.matches_descendant(element))
    }
}

fn parse_list(part: Option<&str>) -> TranslatorResult<Option<SelectorList>> {
    let joined = part
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        return Ok(None);
    }
    SelectorList::parse(&joined)
        .map(Some)
        .map_err(|err| TranslatorError::Selector(err.to_string()))
}

/// 编译后的术语表，模式一律按字面匹配
#[derive(Debug, Clone, Default)]
struct TermMatcher {
    entries: Vec<(Regex, String)>,
}

impl TermMatcher {
    fn compile(terms: &TermDictionary) -> TranslatorResult<Self> {
        let entries = terms
            .entries()
            .iter()
            .map(|entry| {
                let pattern = Regex::new(&regex::escape(&entry.pattern)).map_err(|err| {
                    TranslatorError::Config(format!("术语 '{}' 无法编译: {}", entry.pattern, err))
                })?;
                Ok((pattern, entry.replacement.clone()))
            })
            .collect::<TranslatorResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// 按声明顺序替换，只作用于已有占位符之间的文本
    fn apply(&self, mut text: String, placeholders: &mut Vec<String>) -> String {
        for (pattern, replacement) in self.entries.iter() {
            let mut out = String::with_capacity(text.len());
            let mut last = 0;
            for token in placeholder_regex().find_iter(&text) {
                out.push_str(&Self::replace_in(
                    pattern,
                    replacement,
                    &text[last..token.start()],
                    placeholders,
                ));
                out.push_str(token.as_str());
                last = token.end();
            }
            out.push_str(&Self::replace_in(
                pattern,
                replacement,
                &text[last..],
                placeholders,
            ));
            text = out;
        }
        text
    }

    fn replace_in(
        pattern: &Regex,
        replacement: &str,
        segment: &str,
        placeholders: &mut Vec<String>,
    ) -> String {
        pattern
            .replace_all(segment, |_: &Captures| {
                let token = format!("[{}]", placeholders.len());
                placeholders.push(format!(
                    "<i class=\"{}\">{}</i>",
                    TERM_CLASS, replacement
                ));
                token
            })
            .into_owned()
    }
}

/// 编码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedQuery {
    /// 发送给翻译服务的单行文本
    pub text: String,
    /// 第 `i` 项是 `[i]` 对应的标记
    pub placeholders: Vec<String>,
}

impl EncodedQuery {
    /// 去掉占位符并裁剪空白后的字符数
    pub fn clean_len(&self) -> usize {
        placeholder_regex()
            .replace_all(&self.text, "")
            .trim()
            .chars()
            .count()
    }

    pub fn within(&self, min_len: usize, max_len: usize) -> bool {
        let len = self.clean_len();
        len >= min_len && len <= max_len
    }
}

/// 占位符编解码器，随规则编译一次
#[derive(Debug, Clone, Default)]
pub struct PlaceholderCodec {
    keep: KeepSelector,
    terms: TermMatcher,
}

impl PlaceholderCodec {
    pub fn new(keep: KeepSelector, terms: &TermDictionary) -> TranslatorResult<Self> {
        Ok(Self {
            keep,
            terms: TermMatcher::compile(terms)?,
        })
    }

    pub fn keep(&self) -> &KeepSelector {
        &self.keep
    }

    /// 编码元素内容
    pub fn encode(&self, page: &Page, node: &Handle) -> EncodedQuery {
        let mut placeholders = Vec::new();
        let mut text = String::new();

        for child in node.children.borrow().iter() {
            match &child.data {
                NodeData::Element { .. } => {
                    if self.keep.protects(child) {
                        text.push_str(&format!("[{}]", placeholders.len()));
                        placeholders.push(outer_html(&pinned_copy(page, child)));
                    } else {
                        text.push_str(&text_content(child));
                    }
                }
                NodeData::Text { contents } => text.push_str(&contents.borrow()),
                _ => {}
            }
        }

        if text.is_empty() {
            text = rendered_text(node);
        }

        let text = self.terms.apply(text, &mut placeholders);
        let text = text.replace(|c: char| c == '\r' || c == '\n', " ");

        EncodedQuery { text, placeholders }
    }

    /// 把译文还原为游离节点序列
    pub fn decode(text: &str, placeholders: &[String]) -> Vec<Handle> {
        let mut nodes = Vec::new();
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(text) {
            let Some(token) = caps.get(0) else {
                continue;
            };
            if token.start() > last {
                nodes.push(create_text(&text[last..token.start()]));
            }

            let markup = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| placeholders.get(index))
                .filter(|markup| !markup.is_empty());
            match markup {
                Some(markup) => nodes.extend(parse_fragment(markup)),
                None => nodes.push(create_text(token.as_str())),
            }
            last = token.end();
        }

        if last < text.len() {
            nodes.push(create_text(&text[last..]));
        }
        nodes
    }
}

/// 复制受保护元素，并为其中的图片固定像素尺寸
fn pinned_copy(page: &Page, element: &Handle) -> Handle {
    let copy = deep_clone(element);

    let mut originals = vec![element.clone()];
    originals.extend(descendant_elements(element));
    let mut copies = vec![copy.clone()];
    copies.extend(descendant_elements(&copy));

    for (original, cloned) in originals.iter().zip(copies.iter()) {
        if get_node_name(original) != Some("img") {
            continue;
        }
        if let Some((width, height)) = image_size(page, original) {
            append_inline_style(cloned, &format!("width: {}px; height: {}px;", width, height));
        }
    }
    copy
}

fn image_size(page: &Page, image: &Handle) -> Option<(f64, f64)> {
    if let Some(size) = page.box_size(image) {
        return Some(size);
    }
    let width = get_node_attr(image, "width")?.trim().parse::<f64>().ok()?;
    let height = get_node_attr(image, "height")?.trim().parse::<f64>().ok()?;
    Some((width, height))
}
