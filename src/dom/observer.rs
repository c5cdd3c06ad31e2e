//! 观察者与事件
//!
//! 变更观察者和可见性观察者都通过无界通道异步投递：写操作只负责入队，
//! 消费方在下一次调度时按顺序取出。`disconnect()` 之后，尚未取出的
//! 通知会被丢弃。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, WeakHandle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::node::NodeKey;
use super::page::Page;

/// 子节点列表变更记录
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub target: Handle,
    pub added_nodes: Vec<Handle>,
    pub removed_nodes: Vec<Handle>,
    /// 写操作发生在 [`Page::internal_write`] 之内
    pub internal: bool,
}

/// 观察者通知的接收端
///
/// 每条通知都带有发送时的代数，`disconnect()` 会推进代数，
/// 因此旧代数的通知在接收时被静默跳过。
pub struct ObserverReceiver<T> {
    rx: UnboundedReceiver<(u64, T)>,
    generation: Rc<Cell<u64>>,
}

impl<T> ObserverReceiver<T> {
    fn new(rx: UnboundedReceiver<(u64, T)>, generation: Rc<Cell<u64>>) -> Self {
        Self { rx, generation }
    }

    /// 等待下一条有效通知，所有发送端释放后返回 `None`
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let (generation, item) = self.rx.recv().await?;
            if generation == self.generation.get() {
                return Some(item);
            }
        }
    }

    /// 取出当前已排队的一条有效通知，不等待
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok((generation, item)) if generation == self.generation.get() => {
                    return Some(item)
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// 取出当前已排队的全部有效通知
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.try_recv() {
            items.push(item);
        }
        items
    }
}

pub(crate) struct MutationSlot {
    roots: RefCell<Vec<Handle>>,
    sender: UnboundedSender<(u64, MutationRecord)>,
    generation: Rc<Cell<u64>>,
}

impl MutationSlot {
    /// 记录所在的树根被观察时才投递
    pub(crate) fn deliver(&self, root: &Handle, record: &MutationRecord) {
        let observed = self.roots.borrow().iter().any(|r| Rc::ptr_eq(r, root));
        if observed {
            let _ = self.sender.send((self.generation.get(), record.clone()));
        }
    }
}

/// 子节点列表变更观察者
///
/// 观察一个树根即观察其整棵子树（不含其中挂载的影子根，影子根需要单独观察）。
#[derive(Clone)]
pub struct MutationObserver {
    slot: Rc<MutationSlot>,
}

impl MutationObserver {
    pub(crate) fn new() -> (Self, ObserverReceiver<MutationRecord>, Rc<MutationSlot>) {
        let (sender, rx) = mpsc::unbounded_channel();
        let generation = Rc::new(Cell::new(0));
        let slot = Rc::new(MutationSlot {
            roots: RefCell::new(Vec::new()),
            sender,
            generation: generation.clone(),
        });
        let observer = Self { slot: slot.clone() };
        (observer, ObserverReceiver::new(rx, generation), slot)
    }

    /// 开始观察 `root`，重复观察同一树根无效果
    pub fn observe(&self, root: &Handle) {
        let mut roots = self.slot.roots.borrow_mut();
        if !roots.iter().any(|r| Rc::ptr_eq(r, root)) {
            roots.push(root.clone());
        }
    }

    pub fn is_observing(&self, root: &Handle) -> bool {
        self.slot.roots.borrow().iter().any(|r| Rc::ptr_eq(r, root))
    }

    /// 停止观察所有树根，并丢弃尚未取出的记录
    pub fn disconnect(&self) {
        self.slot.roots.borrow_mut().clear();
        self.slot.generation.set(self.slot.generation.get() + 1);
    }
}

/// 可见性变化通知
#[derive(Debug, Clone)]
pub struct IntersectionEntry {
    pub target: Handle,
    pub ratio: f64,
    pub is_intersecting: bool,
}

pub(crate) struct IntersectionSlot {
    threshold: f64,
    targets: RefCell<HashMap<NodeKey, (WeakHandle, bool)>>,
    sender: UnboundedSender<(u64, IntersectionEntry)>,
    generation: Rc<Cell<u64>>,
}

impl IntersectionSlot {
    fn is_intersecting(&self, ratio: f64) -> bool {
        ratio > 0.0 && ratio >= self.threshold
    }

    fn send(&self, target: &Handle, ratio: f64, is_intersecting: bool) {
        let entry = IntersectionEntry {
            target: target.clone(),
            ratio,
            is_intersecting,
        };
        let _ = self.sender.send((self.generation.get(), entry));
    }

    /// 页面报告了新的可见比例，状态变化时投递
    pub(crate) fn update(&self, node: &Handle, ratio: f64) {
        let now = self.is_intersecting(ratio);
        let changed = {
            let mut targets = self.targets.borrow_mut();
            match targets.get_mut(&NodeKey::of(node)) {
                Some((_, last)) if *last != now => {
                    *last = now;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.send(node, ratio, now);
        }
    }
}

/// 可见性观察者
#[derive(Clone)]
pub struct IntersectionObserver {
    page: Page,
    slot: Rc<IntersectionSlot>,
}

impl IntersectionObserver {
    pub(crate) fn new(
        page: Page,
        threshold: f64,
    ) -> (Self, ObserverReceiver<IntersectionEntry>, Rc<IntersectionSlot>) {
        let (sender, rx) = mpsc::unbounded_channel();
        let generation = Rc::new(Cell::new(0));
        let slot = Rc::new(IntersectionSlot {
            threshold,
            targets: RefCell::new(HashMap::new()),
            sender,
            generation: generation.clone(),
        });
        let observer = Self {
            page,
            slot: slot.clone(),
        };
        (observer, ObserverReceiver::new(rx, generation), slot)
    }

    pub fn threshold(&self) -> f64 {
        self.slot.threshold
    }

    /// 开始观察节点，并立即投递一条当前状态
    pub fn observe(&self, node: &Handle) {
        let key = NodeKey::of(node);
        if self.slot.targets.borrow().contains_key(&key) {
            return;
        }

        let ratio = self.page.visibility(node);
        let state = self.slot.is_intersecting(ratio);
        self.slot
            .targets
            .borrow_mut()
            .insert(key, (Rc::downgrade(node), state));
        self.slot.send(node, ratio, state);
    }

    pub fn unobserve(&self, node: &Handle) {
        self.slot.targets.borrow_mut().remove(&NodeKey::of(node));
    }

    pub fn is_observing(&self, node: &Handle) -> bool {
        self.slot.targets.borrow().contains_key(&NodeKey::of(node))
    }

    pub fn observed_count(&self) -> usize {
        self.slot.targets.borrow().len()
    }

    /// 停止观察全部节点，并丢弃尚未取出的通知
    pub fn disconnect(&self) {
        self.slot.targets.borrow_mut().clear();
        self.slot.generation.set(self.slot.generation.get() + 1);
    }
}

/// 指针事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEventKind {
    Enter,
    Leave,
}

/// 事件发生时按下的修饰键
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        alt: false,
        ctrl: false,
        shift: false,
    };
}

/// 指针事件
#[derive(Debug, Clone)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub target: Handle,
    pub modifiers: Modifiers,
}

/// 事件监听器
pub type Listener = Rc<dyn Fn(&PointerEvent)>;

/// 监听器标识，用于解绑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}
