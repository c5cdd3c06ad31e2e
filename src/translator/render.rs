//! 单节点渲染
//!
//! `render(node)` 分为同步准备和异步完成两段：准备阶段清理旧输出、
//! 编码、挂上空的宿主元素并签发请求令牌；完成阶段等待翻译结果，
//! 只有令牌仍是该节点最新的令牌时才写回。
//!
//! 被跟踪的节点把令牌、`replace` 快照和样式备份记在跟踪表里；
//! 未被跟踪的单次渲染只在旁路表里记录令牌。

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use markup5ever_rcdom::{Handle, WeakHandle};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::dom::node::{
    create_element, deep_clone, descendant_elements, get_node_name, rendered_text,
    set_node_attr, NodeKey,
};
use crate::translator::codec::{EncodedQuery, PlaceholderCodec};
use crate::translator::config::constants::HOST_STYLE_ATTR;
use crate::translator::config::DisplayMode;
use crate::translator::lifecycle::Engine;

/// 引擎统计信息
///
/// 计数器使用原子类型，读取时通过 [`EngineStats::snapshot`] 得到普通数值。
#[derive(Debug, Default)]
pub struct EngineStats {
    /// 进入准备阶段的渲染次数
    pub renders_started: AtomicUsize,
    /// 成功写回的渲染次数
    pub renders_applied: AtomicUsize,
    /// 因被更新的渲染取代而丢弃的结果数
    pub renders_stale: AtomicUsize,
    /// 翻译失败或返回空结果的次数
    pub renders_failed: AtomicUsize,
    /// 文本为空或长度越界而跳过的次数
    pub renders_skipped: AtomicUsize,
    /// 由页面变更触发的重扫描次数
    pub mutation_rescans: AtomicUsize,
    pub characters_sent: AtomicUsize,
    pub characters_received: AtomicUsize,
}

impl EngineStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_mutation_rescans(&self) {
        Self::bump(&self.mutation_rescans);
    }

    pub fn add_characters_sent(&self, count: usize) {
        self.characters_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_characters_received(&self, count: usize) {
        self.characters_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            renders_started: self.renders_started.load(Ordering::Relaxed),
            renders_applied: self.renders_applied.load(Ordering::Relaxed),
            renders_stale: self.renders_stale.load(Ordering::Relaxed),
            renders_failed: self.renders_failed.load(Ordering::Relaxed),
            renders_skipped: self.renders_skipped.load(Ordering::Relaxed),
            mutation_rescans: self.mutation_rescans.load(Ordering::Relaxed),
            characters_sent: self.characters_sent.load(Ordering::Relaxed),
            characters_received: self.characters_received.load(Ordering::Relaxed),
        }
    }
}

/// 统计信息快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub renders_started: usize,
    pub renders_applied: usize,
    pub renders_stale: usize,
    pub renders_failed: usize,
    pub renders_skipped: usize,
    pub mutation_rescans: usize,
    pub characters_sent: usize,
    pub characters_received: usize,
}

/// 跟踪表中的一项
pub(crate) struct TrackedNode {
    node: WeakHandle,
    /// 最近一次签发的请求令牌，0 表示尚未渲染
    pub(crate) token: u64,
    /// `replace` 模式下首次渲染前的子节点副本
    pub(crate) snapshot: Option<Vec<Handle>>,
    /// 追加 `select_style` 之前的 `style` 属性
    pub(crate) style_backup: Option<Option<String>>,
}

/// 候选节点跟踪表，保持登记顺序
#[derive(Default)]
pub(crate) struct TrackingMap {
    order: Vec<NodeKey>,
    entries: HashMap<NodeKey, TrackedNode>,
}

impl TrackingMap {
    /// 登记节点，已登记时返回 `false`
    pub(crate) fn insert(&mut self, node: &Handle) -> bool {
        let key = NodeKey::of(node);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.order.push(key);
        self.entries.insert(
            key,
            TrackedNode {
                node: Rc::downgrade(node),
                token: 0,
                snapshot: None,
                style_backup: None,
            },
        );
        true
    }

    pub(crate) fn contains(&self, node: &Handle) -> bool {
        self.entries.contains_key(&NodeKey::of(node))
    }

    pub(crate) fn get_mut(&mut self, node: &Handle) -> Option<&mut TrackedNode> {
        self.entries.get_mut(&NodeKey::of(node))
    }

    pub(crate) fn token(&self, node: &Handle) -> Option<u64> {
        self.entries.get(&NodeKey::of(node)).map(|entry| entry.token)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// 按登记顺序列出仍然存活的节点
    pub(crate) fn nodes(&self) -> Vec<Handle> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .filter_map(|entry| entry.node.upgrade())
            .collect()
    }

    /// 清空并按登记顺序返回全部存活项
    pub(crate) fn drain(&mut self) -> Vec<(Handle, TrackedNode)> {
        let mut entries = std::mem::take(&mut self.entries);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .filter_map(|entry| entry.node.upgrade().map(|node| (node, entry)))
            .collect()
    }
}

/// 未跟踪节点的令牌旁路表
#[derive(Default)]
pub(crate) struct UntrackedTokens {
    entries: HashMap<NodeKey, (WeakHandle, u64)>,
}

impl UntrackedTokens {
    pub(crate) fn set(&mut self, node: &Handle, token: u64) {
        self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
        self.entries
            .insert(NodeKey::of(node), (Rc::downgrade(node), token));
    }

    pub(crate) fn get(&self, node: &Handle) -> Option<u64> {
        self.entries.get(&NodeKey::of(node)).map(|(_, token)| *token)
    }
}

/// 进行中的异步任务计数
#[derive(Default)]
pub(crate) struct InFlight {
    count: Cell<usize>,
    notify: Notify,
}

impl InFlight {
    pub(crate) fn enter(self: &Rc<Self>) -> InFlightGuard {
        self.count.set(self.count.get() + 1);
        InFlightGuard(self.clone())
    }

    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }

    /// 先让出若干次，让已排队的观察者通知得到处理，再等待计数归零
    pub(crate) async fn idle(&self) {
        loop {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            let notified = self.notify.notified();
            if self.count.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// 任务结束（包括被中止）时自动减少计数
pub(crate) struct InFlightGuard(Rc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.0.count.get().saturating_sub(1);
        self.0.count.set(remaining);
        if remaining == 0 {
            self.0.notify.notify_waiters();
        }
    }
}

/// 一批已启动的渲染任务
#[derive(Debug)]
pub struct RenderTasks {
    handles: Vec<JoinHandle<()>>,
}

impl RenderTasks {
    pub(crate) fn new(handles: Vec<JoinHandle<()>>) -> Self {
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 等待全部任务结束
    pub async fn settled(self) {
        for result in join_all(self.handles).await {
            if let Err(err) = result {
                if !err.is_cancelled() {
                    tracing::warn!("渲染任务异常结束: {}", err);
                }
            }
        }
    }
}

/// 准备阶段的产物
struct PreparedRender {
    node: Handle,
    host: Handle,
    token: u64,
    mode: DisplayMode,
    query: EncodedQuery,
}

impl Engine {
    /// 启动一次渲染：同步完成准备阶段，异步等待翻译
    pub(crate) fn start_render(self: &Rc<Self>, node: &Handle) -> JoinHandle<()> {
        let Some(prepared) = self.prepare_render(node) else {
            return tokio::task::spawn_local(async {});
        };

        let guard = self.in_flight.enter();
        let engine = self.clone();
        tokio::task::spawn_local(async move {
            engine.complete_render(prepared).await;
            drop(guard);
        })
    }

    fn prepare_render(&self, node: &Handle) -> Option<PreparedRender> {
        let (host_tag, mode, text_style, codec, min_len, max_len) = {
            let state = self.state.borrow();
            (
                state.setting.host_tag.clone(),
                state.rule.display_mode,
                state.rule.text_style,
                state.compiled.codec.clone(),
                state.rule.min_len,
                state.rule.max_len,
            )
        };
        EngineStats::bump(&self.stats.renders_started);

        // 1. 清理旧输出
        for host in hosts_under(node, &host_tag) {
            self.page.internal_write(|| self.page.remove(&host));
        }

        // 2. 空文本不处理
        let raw = rendered_text(node).trim().to_string();
        if raw.is_empty() {
            EngineStats::bump(&self.stats.renders_skipped);
            return None;
        }

        // 3. replace 模式首次渲染前保存快照
        let tracked = self.state.borrow().tracking.contains(node);
        if tracked && mode == DisplayMode::Replace {
            let mut state = self.state.borrow_mut();
            if let Some(entry) = state.tracking.get_mut(node) {
                if entry.snapshot.is_none() {
                    entry.snapshot = Some(node.children.borrow().iter().map(deep_clone).collect());
                }
            }
        }

        // 4. 通知宿主
        let on_render_start = self.hooks.borrow().on_render_start.clone();
        if let Some(hook) = on_render_start {
            hook(node, &raw);
        }

        // 5. 编码并检查长度
        let query = codec.encode(&self.page, node);
        if !query.within(min_len, max_len) {
            tracing::debug!(
                "文本长度 {} 不在 [{}, {}] 内，跳过",
                query.clean_len(),
                min_len,
                max_len
            );
            EngineStats::bump(&self.stats.renders_skipped);
            return None;
        }

        // 6. 挂上空宿主并签发令牌
        let host = create_element(&host_tag, &[(HOST_STYLE_ATTR, text_style.as_str())]);
        self.page
            .internal_write(|| self.page.append_child(node, host.clone()));

        let token = self.next_token();
        {
            let mut state = self.state.borrow_mut();
            match state.tracking.get_mut(node) {
                Some(entry) => entry.token = token,
                None => state.untracked.set(node, token),
            }
        }

        Some(PreparedRender {
            node: node.clone(),
            host,
            token,
            mode,
            query,
        })
    }

    async fn complete_render(&self, prepared: PreparedRender) {
        let PreparedRender {
            node,
            host,
            token,
            mode,
            query,
        } = prepared;

        // 7. 等待翻译
        self.stats.add_characters_sent(query.text.chars().count());
        let result = self.backend.translate(&query.text).await;

        let translated = match result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                // 9. 空结果按失败处理
                tracing::warn!("翻译服务返回了空结果");
                EngineStats::bump(&self.stats.renders_failed);
                self.page.internal_write(|| self.page.remove(&host));
                return;
            }
            Err(err) => {
                tracing::warn!("翻译失败: {}", err);
                EngineStats::bump(&self.stats.renders_failed);
                self.page.internal_write(|| self.page.remove(&host));
                return;
            }
        };

        // 8. 只接受最新令牌的结果
        if self.current_token(&node) != Some(token) {
            tracing::debug!("令牌 {} 已过期，丢弃结果", token);
            EngineStats::bump(&self.stats.renders_stale);
            self.page.internal_write(|| self.page.remove(&host));
            return;
        }

        self.stats
            .add_characters_received(translated.chars().count());
        let fragment = PlaceholderCodec::decode(&translated, &query.placeholders);
        let target = match mode {
            DisplayMode::Replace => &node,
            DisplayMode::Overlay => &host,
        };
        self.page
            .internal_write(|| self.page.replace_children(target, fragment));
        EngineStats::bump(&self.stats.renders_applied);
    }

    fn current_token(&self, node: &Handle) -> Option<u64> {
        let state = self.state.borrow();
        state
            .tracking
            .token(node)
            .or_else(|| state.untracked.get(node))
    }

    /// 恢复全部被跟踪的节点并清空跟踪表
    pub(crate) fn restore_tracked(&self) {
        let (entries, host_tag) = {
            let mut state = self.state.borrow_mut();
            (state.tracking.drain(), state.setting.host_tag.clone())
        };
        let on_remove = self.hooks.borrow().on_remove.clone();

        for (node, entry) in entries {
            for host in hosts_under(&node, &host_tag) {
                self.page.internal_write(|| self.page.remove(&host));
            }
            if let Some(snapshot) = entry.snapshot {
                self.page
                    .internal_write(|| self.page.replace_children(&node, snapshot));
            }
            if let Some(style) = entry.style_backup {
                set_node_attr(&node, "style", style);
            }
            if let Some(hook) = on_remove.as_ref() {
                hook(&node);
            }
        }
    }
}

/// `node` 子树中的宿主元素
pub(crate) fn hosts_under(node: &Handle, host_tag: &str) -> Vec<Handle> {
    descendant_elements(node)
        .into_iter()
        .filter(|el| get_node_name(el) == Some(host_tag))
        .collect()
}
