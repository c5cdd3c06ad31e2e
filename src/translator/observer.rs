//! 触发策略与页面观察
//!
//! - 每个候选节点按规则的触发策略挂上可见性观察或悬停监听
//! - 一个变更观察者覆盖所有已知树根，有意义的变更触发防抖重扫描
//! - 订阅页面的树根发现端口，新挂载的影子根立即纳入

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, WeakHandle};
use tokio::task::JoinHandle;

use crate::dom::node::{
    descendant_elements, get_node_attr, get_node_name, is_element, parent_of, NodeKey,
};
use crate::dom::{
    IntersectionObserver, ListenerId, Listener, MutationObserver, MutationRecord, PointerEvent,
    PointerEventKind, RootDiscovery,
};
use crate::translator::config::constants::{DOCUMENT_STYLE_ID, STYLE_MARKER_ATTR};
use crate::translator::config::{HoverKey, Trigger};
use crate::translator::lifecycle::Engine;
use crate::translator::style::ensure_styles;

/// 共享的可见性观察者及其通知泵
pub(crate) struct VisibilityWatch {
    observer: IntersectionObserver,
    pump: JoinHandle<()>,
}

/// 变更观察者及其通知泵
pub(crate) struct MutationWatch {
    observer: MutationObserver,
    pump: JoinHandle<()>,
}

impl Drop for VisibilityWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
        self.pump.abort();
    }
}

impl Drop for MutationWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
        self.pump.abort();
    }
}

/// 一个节点上的悬停监听器
pub(crate) struct HoverBinding {
    node: WeakHandle,
    enter: ListenerId,
    leave: ListenerId,
}

/// 防抖重扫描的单槽队列
///
/// 同一时间最多一个待执行的定时器；新的请求重置定时器。
/// 重扫描执行期间到达的请求只记下标记，执行完毕后重新排期。
#[derive(Default)]
pub(crate) struct RescanScheduler {
    pending: RefCell<Option<JoinHandle<()>>>,
    running: Cell<bool>,
    rearm: Cell<bool>,
    from_mutation: Cell<bool>,
}

impl RescanScheduler {
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// 取消尚未执行的重扫描
    pub(crate) fn cancel(&self) {
        if let Some(pending) = self.pending.borrow_mut().take() {
            pending.abort();
        }
        self.rearm.set(false);
        self.from_mutation.set(false);
    }
}

impl Engine {
    // ---- 触发策略 ----

    /// 按当前触发策略为新登记的节点挂上触发器
    pub(crate) fn arm_trigger(self: &Rc<Self>, node: &Handle) {
        let (trigger, hover_key) = {
            let state = self.state.borrow();
            (state.rule.trigger, state.rule.hover_key)
        };
        match trigger {
            Trigger::OnVisible => self.observe_visible(node),
            Trigger::OnHover => self.bind_hover(node, hover_key),
            Trigger::Eager | Trigger::Manual => {}
        }
    }

    /// 解除节点上的触发器
    pub(crate) fn disarm_trigger(&self, node: &Handle) {
        if let Some(watch) = self.state.borrow().visibility.as_ref() {
            watch.observer.unobserve(node);
        }
        self.unbind_hover(node);
    }

    fn observe_visible(self: &Rc<Self>, node: &Handle) {
        let observer = self.visibility_observer();
        observer.observe(node);
    }

    /// 共享的可见性观察者，首次使用时创建
    fn visibility_observer(self: &Rc<Self>) -> IntersectionObserver {
        if let Some(watch) = self.state.borrow().visibility.as_ref() {
            return watch.observer.clone();
        }

        let threshold = self.state.borrow().setting.visible_threshold;
        let (observer, mut receiver) = self.page.intersection_observer(threshold);
        let weak = Rc::downgrade(self);
        let pump = tokio::task::spawn_local(async move {
            while let Some(entry) = receiver.recv().await {
                if !entry.is_intersecting {
                    continue;
                }
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                engine.on_visible(&entry.target);
            }
        });

        tracing::debug!("创建可见性观察者，阈值 {}", threshold);
        self.state.borrow_mut().visibility = Some(VisibilityWatch {
            observer: observer.clone(),
            pump,
        });
        observer
    }

    fn on_visible(self: &Rc<Self>, node: &Handle) {
        let observing = match self.state.borrow().visibility.as_ref() {
            Some(watch) if watch.observer.is_observing(node) => {
                watch.observer.unobserve(node);
                true
            }
            _ => false,
        };
        if observing && self.state.borrow().tracking.contains(node) {
            tracing::debug!("节点进入可见区域，开始渲染");
            self.start_render(node);
        }
    }

    fn bind_hover(self: &Rc<Self>, node: &Handle, hover_key: Option<HoverKey>) {
        let key = NodeKey::of(node);
        if self.state.borrow().hover.contains_key(&key) {
            return;
        }

        let weak_engine: Weak<Engine> = Rc::downgrade(self);
        let weak_node = Rc::downgrade(node);
        let enter: Listener = Rc::new(move |event: &PointerEvent| {
            let qualified = match hover_key {
                None => true,
                Some(HoverKey::Alt) => event.modifiers.alt,
                Some(HoverKey::Ctrl) => event.modifiers.ctrl,
                Some(HoverKey::Shift) => event.modifiers.shift,
            };
            if !qualified {
                return;
            }
            let (Some(engine), Some(node)) = (weak_engine.upgrade(), weak_node.upgrade()) else {
                return;
            };
            engine.unbind_hover(&node);
            engine.start_render(&node);
        });
        let leave: Listener = Rc::new(|_: &PointerEvent| {});

        let enter = self
            .page
            .add_event_listener(node, PointerEventKind::Enter, enter);
        let leave = self
            .page
            .add_event_listener(node, PointerEventKind::Leave, leave);
        self.state.borrow_mut().hover.insert(
            key,
            HoverBinding {
                node: Rc::downgrade(node),
                enter,
                leave,
            },
        );
    }

    fn unbind_hover(&self, node: &Handle) {
        let binding = self.state.borrow_mut().hover.remove(&NodeKey::of(node));
        if let Some(binding) = binding {
            self.page.remove_event_listener(node, binding.enter);
            self.page.remove_event_listener(node, binding.leave);
        }
    }

    /// 停止全部触发器
    pub(crate) fn disarm_all(&self) {
        let (visibility, hover) = {
            let mut state = self.state.borrow_mut();
            (state.visibility.take(), std::mem::take(&mut state.hover))
        };
        drop(visibility);
        for binding in hover.into_values() {
            if let Some(node) = binding.node.upgrade() {
                self.page.remove_event_listener(&node, binding.enter);
                self.page.remove_event_listener(&node, binding.leave);
            }
        }
    }

    // ---- 结构变更 ----

    /// 开始观察所有已知树根
    pub(crate) fn observe_roots(self: &Rc<Self>) {
        let observer = self.mutation_observer();
        for root in self.state.borrow().roots.iter() {
            observer.observe(root);
        }
    }

    pub(crate) fn stop_observing_roots(&self) {
        if let Some(watch) = self.state.borrow().mutations.as_ref() {
            watch.observer.disconnect();
        }
    }

    fn mutation_observer(self: &Rc<Self>) -> MutationObserver {
        if let Some(watch) = self.state.borrow().mutations.as_ref() {
            return watch.observer.clone();
        }

        let (observer, mut receiver) = self.page.mutation_observer();
        let weak = Rc::downgrade(self);
        let pump = tokio::task::spawn_local(async move {
            while let Some(record) = receiver.recv().await {
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                if engine.is_meaningful(&record) {
                    tracing::debug!("检测到页面结构变更，安排重扫描");
                    engine.schedule_rescan(true);
                }
            }
        });

        self.state.borrow_mut().mutations = Some(MutationWatch {
            observer: observer.clone(),
            pump,
        });
        observer
    }

    /// 变更是否来自页面本身而非引擎的写入
    ///
    /// 引擎的写入都在 [`Page::internal_write`](crate::dom::Page::internal_write)
    /// 之内完成；其余记录只要加入了页面自己的元素就算有意义，
    /// 插入点在候选节点内部也一样。
    pub(crate) fn is_meaningful(&self, record: &MutationRecord) -> bool {
        if record.internal || record.added_nodes.is_empty() {
            return false;
        }

        let state = self.state.borrow();
        let host_tag = state.setting.host_tag.as_str();
        if std::iter::successors(Some(record.target.clone()), parent_of)
            .any(|node| get_node_name(&node) == Some(host_tag))
        {
            return false;
        }

        record.added_nodes.iter().any(|added| {
            is_element(added)
                && get_node_name(added) != Some(host_tag)
                && get_node_attr(added, STYLE_MARKER_ATTR).is_none()
                && get_node_attr(added, "id").as_deref() != Some(DOCUMENT_STYLE_ID)
                && !descendant_elements(added)
                    .iter()
                    .any(|el| get_node_name(el) == Some(host_tag))
        })
    }

    // ---- 新树根 ----

    /// 订阅树根发现端口，每个引擎只安装一次
    pub(crate) fn install_root_hook(self: &Rc<Self>) {
        if self.state.borrow().root_hook.is_some() {
            return;
        }

        let mut roots = self.page.subscribe_roots();
        let weak = Rc::downgrade(self);
        let hook = tokio::task::spawn_local(async move {
            while let Some(root) = roots.recv().await {
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                engine.on_new_root(root);
            }
        });
        self.state.borrow_mut().root_hook = Some(hook);
    }

    fn on_new_root(self: &Rc<Self>, root: Handle) {
        let host_tag = {
            let mut state = self.state.borrow_mut();
            if !state.registered {
                return;
            }
            if state.roots.iter().any(|r| Rc::ptr_eq(r, &root)) {
                return;
            }
            state.roots.push(root.clone());
            state.setting.host_tag.clone()
        };

        tracing::info!("发现新的影子根");
        ensure_styles(&self.page, &root, &host_tag);
        if let Some(watch) = self.state.borrow().mutations.as_ref() {
            watch.observer.observe(&root);
        }
        self.schedule_rescan(false);
    }

    // ---- 防抖重扫描 ----

    /// 安排一次重扫描；执行中到达的请求在结束后重新排期
    pub(crate) fn schedule_rescan(self: &Rc<Self>, from_mutation: bool) {
        let scheduler = &self.rescan;
        if from_mutation {
            scheduler.from_mutation.set(true);
        }
        if scheduler.running.get() {
            scheduler.rearm.set(true);
            return;
        }

        let delay = self.state.borrow().setting.reflow_debounce();
        if let Some(previous) = scheduler.pending.borrow_mut().take() {
            previous.abort();
        }

        let weak = Rc::downgrade(self);
        let timer = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = weak.upgrade() {
                engine.run_rescan();
            }
        });
        *scheduler.pending.borrow_mut() = Some(timer);
    }

    fn run_rescan(self: &Rc<Self>) {
        let scheduler = &self.rescan;
        scheduler.pending.borrow_mut().take();
        if !self.state.borrow().registered {
            scheduler.from_mutation.set(false);
            return;
        }

        if scheduler.from_mutation.replace(false) {
            self.stats.inc_mutation_rescans();
        }
        scheduler.running.set(true);
        tracing::info!("执行重扫描");
        self.unregister_inner(false);
        self.register_inner();
        scheduler.running.set(false);

        if scheduler.rearm.replace(false) {
            self.schedule_rescan(false);
        }
    }
}
