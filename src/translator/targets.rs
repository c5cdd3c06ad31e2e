//! 候选节点选择
//!
//! 选择器描述是一个小型配置语法：`;` 分隔多个备选，每个备选可以用
//! `::shadow::` 串联，表示"先在当前树根中匹配外层元素，再进入其影子根继续匹配"。
//! 描述在规则变更时解析一次，之后每次扫描复用。

use std::collections::HashSet;

use markup5ever_rcdom::Handle;

use crate::dom::node::{closest, descendant_elements, get_node_name, parent_of, NodeKey};
use crate::dom::{Page, SelectorList};
use crate::translator::config::Setting;
use crate::translator::error::{TranslatorError, TranslatorResult};

/// 影子根作用域分隔符
pub const SHADOW_MARKER: &str = "::shadow::";

/// 解析后的候选选择器描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSpec {
    source: String,
    /// 每个备选是一条选择器链，除最后一段外每段都进入匹配元素的影子根
    alternatives: Vec<Vec<SelectorList>>,
}

impl SelectorSpec {
    pub fn parse(spec: &str) -> TranslatorResult<Self> {
        let mut alternatives = Vec::new();

        for alternative in spec.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let chain = alternative
                .split(SHADOW_MARKER)
                .map(|part| {
                    SelectorList::parse(part.trim())
                        .map_err(|err| TranslatorError::Selector(err.to_string()))
                })
                .collect::<TranslatorResult<Vec<_>>>()?;
            alternatives.push(chain);
        }

        if alternatives.is_empty() {
            return Err(TranslatorError::Selector("候选选择器不能为空".to_string()));
        }

        Ok(Self {
            source: spec.trim().to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 在单个树根内解析候选节点
    ///
    /// 依次应用：跳过标签过滤、排除宿主元素（自身、其后代或包含宿主的元素）、
    /// 重叠折叠（外层候选胜出），并按首次出现的顺序去重。
    pub fn collect(&self, page: &Page, root: &Handle, setting: &Setting) -> Vec<Handle> {
        let mut matched = Vec::new();
        for chain in self.alternatives.iter() {
            resolve_chain(page, root, chain, &mut matched);
        }

        let mut seen = HashSet::new();
        let filtered: Vec<Handle> = matched
            .into_iter()
            .filter(|node| seen.insert(NodeKey::of(node)))
            .filter(|node| {
                let tag = get_node_name(node).unwrap_or_default();
                !setting.is_skipped(tag)
            })
            .filter(|node| !touches_host(node, &setting.host_tag))
            .collect();

        collapse_overlaps(filtered)
    }
}

fn resolve_chain(page: &Page, root: &Handle, chain: &[SelectorList], out: &mut Vec<Handle>) {
    let Some((last, scopes)) = chain.split_last() else {
        return;
    };

    let mut roots = vec![root.clone()];
    for scope in scopes {
        roots = roots
            .iter()
            .flat_map(|r| scope.query_all(r))
            .filter_map(|host| page.shadow_root(&host))
            .collect();
    }

    for r in roots.iter() {
        out.extend(last.query_all(r));
    }
}

/// 节点本身是宿主、位于宿主内，或包含宿主
fn touches_host(node: &Handle, host_tag: &str) -> bool {
    let is_host = |n: &Handle| get_node_name(n) == Some(host_tag);
    closest(node, is_host).is_some() || descendant_elements(node).iter().any(is_host)
}

/// 祖先也是候选时丢弃后代
fn collapse_overlaps(nodes: Vec<Handle>) -> Vec<Handle> {
    let keys: HashSet<NodeKey> = nodes.iter().map(NodeKey::of).collect();

    nodes
        .into_iter()
        .filter(|node| {
            let mut current = parent_of(node);
            while let Some(ancestor) = current {
                if keys.contains(&NodeKey::of(&ancestor)) {
                    return false;
                }
                current = parent_of(&ancestor);
            }
            true
        })
        .collect()
}

/// 列出 `root` 中所有元素直接挂载的影子根（不递归进入影子根内部）
pub fn shadow_roots_in(page: &Page, root: &Handle) -> Vec<Handle> {
    descendant_elements(root)
        .iter()
        .filter_map(|el| page.shadow_root(el))
        .collect()
}
