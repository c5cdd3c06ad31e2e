//! CSS 选择器子集
//!
//! 使用 `cssparser` 做词法分析，支持：
//!
//! - 类型选择器与 `*`
//! - `#id`、`.class`
//! - 属性选择器 `[a]`、`[a=v]`、`[a~=v]`、`[a|=v]`、`[a^=v]`、`[a$=v]`、`[a*=v]`
//! - 后代（空白）与子（`>`）组合器
//! - 逗号分隔的选择器列表
//!
//! 伪类、伪元素和兄弟组合器会被拒绝。匹配时沿父链向上查找，
//! 遇到文档类节点即停止，因此不会越过影子边界。

use std::mem;

use cssparser::{ParseError, Parser, ParserInput, Token};
use markup5ever_rcdom::Handle;

use super::node::{descendant_elements, get_node_attr, get_node_name, is_element, parent_of};
use super::DomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
    value: String,
}

impl AttrSelector {
    fn matches(&self, element: &Handle) -> bool {
        let Some(actual) = get_node_attr(element, &self.name) else {
            return false;
        };
        let expected = self.value.as_str();

        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => actual.split_whitespace().any(|word| word == expected),
            AttrOp::DashMatch => {
                actual == expected
                    || (actual.starts_with(expected)
                        && actual[expected.len()..].starts_with('-'))
            }
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
        }
    }
}

/// 复合选择器，如 `div.note[lang]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    universal: bool,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && !self.universal
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }

    fn matches(&self, element: &Handle) -> bool {
        let Some(name) = get_node_name(element) else {
            return false;
        };

        if let Some(tag) = &self.tag {
            if !name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if !self.ids.is_empty() {
            let id = get_node_attr(element, "id").unwrap_or_default();
            if self.ids.iter().any(|expected| *expected != id) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let class = get_node_attr(element, "class").unwrap_or_default();
            let present: Vec<&str> = class.split_whitespace().collect();
            if !self.classes.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }

        self.attrs.iter().all(|attr| attr.matches(element))
    }
}

/// 由组合器连接的复合选择器序列，自左向右存放
#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl ComplexSelector {
    fn matches(&self, element: &Handle) -> bool {
        self.matches_from(self.compounds.len() - 1, element)
    }

    fn matches_from(&self, index: usize, element: &Handle) -> bool {
        if !self.compounds[index].matches(element) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match self.combinators[index - 1] {
            Combinator::Child => parent_element(element)
                .map(|parent| self.matches_from(index - 1, &parent))
                .unwrap_or(false),
            Combinator::Descendant => {
                let mut current = parent_element(element);
                while let Some(ancestor) = current {
                    if self.matches_from(index - 1, &ancestor) {
                        return true;
                    }
                    current = parent_element(&ancestor);
                }
                false
            }
        }
    }
}

fn parent_element(node: &Handle) -> Option<Handle> {
    parent_of(node).filter(is_element)
}

/// 解析后的选择器列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    source: String,
    selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    /// 解析逗号分隔的选择器列表
    pub fn parse(input: &str) -> Result<Self, DomError> {
        let invalid = |reason: String| DomError::InvalidSelector {
            selector: input.to_string(),
            reason,
        };

        let mut parser_input = ParserInput::new(input);
        let mut parser = Parser::new(&mut parser_input);

        let mut selectors = Vec::new();
        let mut compounds: Vec<Compound> = Vec::new();
        let mut combinators: Vec<Combinator> = Vec::new();
        let mut current = Compound::default();
        let mut pending: Option<Combinator> = None;

        loop {
            let token = match parser.next_including_whitespace() {
                Ok(token) => Some(token.clone()),
                Err(_) => None,
            };
            let at_end = token.is_none();

            // 进入新的复合选择器之前，先登记连接它的组合器
            let starts_simple = matches!(
                token,
                Some(Token::Ident(_))
                    | Some(Token::IDHash(_))
                    | Some(Token::Hash(_))
                    | Some(Token::Delim('*'))
                    | Some(Token::Delim('.'))
                    | Some(Token::SquareBracketBlock)
            );
            if starts_simple && current.is_empty() && !compounds.is_empty() {
                combinators.push(pending.take().unwrap_or(Combinator::Descendant));
            }

            match token {
                Some(Token::WhiteSpace(_)) => {
                    if !current.is_empty() {
                        compounds.push(mem::take(&mut current));
                        pending = Some(Combinator::Descendant);
                    }
                }
                Some(Token::Delim('>')) => {
                    if !current.is_empty() {
                        compounds.push(mem::take(&mut current));
                    }
                    if compounds.is_empty() {
                        return Err(invalid("combinator without a left-hand side".into()));
                    }
                    pending = Some(Combinator::Child);
                }
                Some(Token::Ident(name)) => {
                    if !current.is_empty() {
                        return Err(invalid(format!("unexpected type selector '{}'", name)));
                    }
                    current.tag = Some(name.to_ascii_lowercase());
                }
                Some(Token::Delim('*')) => {
                    if !current.is_empty() {
                        return Err(invalid("unexpected '*'".into()));
                    }
                    current.universal = true;
                }
                Some(Token::IDHash(id)) | Some(Token::Hash(id)) => {
                    current.ids.push(id.to_string());
                }
                Some(Token::Delim('.')) => {
                    let class = match parser.next_including_whitespace() {
                        Ok(Token::Ident(class)) => class.to_string(),
                        _ => return Err(invalid("expected a class name after '.'".into())),
                    };
                    current.classes.push(class);
                }
                Some(Token::SquareBracketBlock) => {
                    let attr = parser
                        .parse_nested_block(|p| parse_attribute(p))
                        .map_err(|err| invalid(format!("{:?}", err.kind)))?;
                    current.attrs.push(attr);
                }
                Some(Token::Comma) | None => {
                    if !current.is_empty() {
                        compounds.push(mem::take(&mut current));
                    }
                    if pending == Some(Combinator::Child) && combinators.len() < compounds.len() {
                        return Err(invalid("dangling '>' combinator".into()));
                    }
                    if compounds.is_empty() {
                        return Err(invalid("empty selector".into()));
                    }
                    selectors.push(ComplexSelector {
                        compounds: mem::take(&mut compounds),
                        combinators: mem::take(&mut combinators),
                    });
                    pending = None;

                    if at_end {
                        break;
                    }
                }
                Some(Token::Colon) => {
                    return Err(invalid("pseudo-classes are not supported".into()));
                }
                Some(other) => {
                    return Err(invalid(format!("unsupported token {:?}", other)));
                }
            }
        }

        Ok(Self {
            source: input.trim().to_string(),
            selectors,
        })
    }

    /// 原始选择器文本
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 元素是否匹配列表中的任一选择器
    pub fn matches(&self, element: &Handle) -> bool {
        is_element(element) && self.selectors.iter().any(|s| s.matches(element))
    }

    /// 按文档顺序返回 `root` 的所有匹配后代
    pub fn query_all(&self, root: &Handle) -> Vec<Handle> {
        descendant_elements(root)
            .into_iter()
            .filter(|el| self.matches(el))
            .collect()
    }

    /// `root` 是否有任一后代匹配
    pub fn matches_descendant(&self, root: &Handle) -> bool {
        descendant_elements(root).iter().any(|el| self.matches(el))
    }
}

fn parse_attribute<'i, 't>(
    parser: &mut Parser<'i, 't>,
) -> Result<AttrSelector, ParseError<'i, ()>> {
    let name = parser.expect_ident()?.to_ascii_lowercase();
    if parser.is_exhausted() {
        return Ok(AttrSelector {
            name,
            op: AttrOp::Exists,
            value: String::new(),
        });
    }

    let op = match parser.next()?.clone() {
        Token::Delim('=') => AttrOp::Equals,
        Token::IncludeMatch => AttrOp::Includes,
        Token::DashMatch => AttrOp::DashMatch,
        Token::PrefixMatch => AttrOp::Prefix,
        Token::SuffixMatch => AttrOp::Suffix,
        Token::SubstringMatch => AttrOp::Substring,
        token => return Err(parser.new_unexpected_token_error(token)),
    };
    let value = parser.expect_ident_or_string()?.to_string();
    parser.expect_exhausted()?;

    Ok(AttrSelector { name, op, value })
}
