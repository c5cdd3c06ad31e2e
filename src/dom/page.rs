//! 活动页面
//!
//! `Page` 包装一棵 rcdom 文档树，并补上浏览器页面里引擎依赖的那部分行为：
//! 影子根、子节点变更通知、可见性通知、布局尺寸以及指针事件。
//! 克隆 `Page` 只复制引用，所有克隆共享同一个页面。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, NodeData, RcDom, WeakHandle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::node::{
    append, create_document_node, create_element, create_text, descendant_elements, detach,
    get_child_node_by_name, get_node_attr, get_node_name, insert_before, is_element, parent_of,
    shallow_clone, take_children, text_content, top_of, NodeKey,
};
use super::observer::{
    IntersectionEntry, IntersectionObserver, IntersectionSlot, Listener, ListenerId, Modifiers,
    MutationObserver, MutationRecord, MutationSlot, ObserverReceiver, PointerEvent,
    PointerEventKind,
};
use super::parser::{html_to_dom, parse_fragment};
use super::selector::SelectorList;
use super::serializer::inner_html;
use super::DomError;

/// 新树根的发现端口
///
/// 每个订阅者都会按挂载顺序收到此后新挂载的每一个影子根，且只收到一次。
pub trait RootDiscovery {
    fn subscribe_roots(&self) -> UnboundedReceiver<Handle>;
}

struct ListenerEntry {
    id: ListenerId,
    kind: PointerEventKind,
    listener: Listener,
}

/// 以节点为键的附加数据，值中保留弱引用以固定节点地址
type NodeTable<V> = RefCell<HashMap<NodeKey, (WeakHandle, V)>>;

struct PageInner {
    document: Handle,
    /// 宿主 -> 影子根
    shadow_roots: NodeTable<Handle>,
    /// 影子根 -> 宿主
    shadow_hosts: NodeTable<()>,
    mutation_slots: RefCell<Vec<Weak<MutationSlot>>>,
    intersection_slots: RefCell<Vec<Weak<IntersectionSlot>>>,
    visibility: NodeTable<f64>,
    box_sizes: NodeTable<(f64, f64)>,
    listeners: NodeTable<Vec<ListenerEntry>>,
    next_listener: Cell<u64>,
    root_subscribers: RefCell<Vec<UnboundedSender<Handle>>>,
    internal_depth: Cell<u32>,
}

struct InternalScope<'a>(&'a Cell<u32>);

impl Drop for InternalScope<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

#[derive(Clone)]
pub struct Page {
    inner: Rc<PageInner>,
}

impl Page {
    /// 解析 UTF-8 HTML
    pub fn parse(html: &str) -> Self {
        Self::from_bytes(html.as_bytes(), "utf-8")
    }

    /// 按指定字符集解析 HTML 字节
    pub fn from_bytes(data: &[u8], charset: &str) -> Self {
        Self::from_dom(html_to_dom(data, charset))
    }

    /// 接管已解析的文档，并把声明式影子根挂载到各自的宿主上
    pub fn from_dom(dom: RcDom) -> Self {
        let page = Self {
            inner: Rc::new(PageInner {
                document: dom.document,
                shadow_roots: RefCell::new(HashMap::new()),
                shadow_hosts: RefCell::new(HashMap::new()),
                mutation_slots: RefCell::new(Vec::new()),
                intersection_slots: RefCell::new(Vec::new()),
                visibility: RefCell::new(HashMap::new()),
                box_sizes: RefCell::new(HashMap::new()),
                listeners: RefCell::new(HashMap::new()),
                next_listener: Cell::new(1),
                root_subscribers: RefCell::new(Vec::new()),
                internal_depth: Cell::new(0),
            }),
        };

        let document = page.document();
        page.attach_declarative_roots(&document);
        page
    }

    pub fn document(&self) -> Handle {
        self.inner.document.clone()
    }

    fn html(&self) -> Option<Handle> {
        get_child_node_by_name(&self.inner.document, "html")
    }

    pub fn head(&self) -> Option<Handle> {
        self.html().and_then(|html| get_child_node_by_name(&html, "head"))
    }

    pub fn body(&self) -> Option<Handle> {
        self.html().and_then(|html| get_child_node_by_name(&html, "body"))
    }

    /// 在主文档中按选择器查找全部元素
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Handle>, DomError> {
        Ok(SelectorList::parse(selector)?.query_all(&self.inner.document))
    }

    /// 在主文档中按选择器查找第一个元素
    pub fn query_selector(&self, selector: &str) -> Result<Option<Handle>, DomError> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    fn title_element(&self) -> Option<Handle> {
        descendant_elements(&self.inner.document)
            .into_iter()
            .find(|el| get_node_name(el) == Some("title"))
    }

    /// 文档标题
    pub fn title(&self) -> Option<String> {
        self.title_element().map(|el| text_content(&el))
    }

    /// 设置文档标题，必要时在 `<head>` 中创建 `<title>`
    pub fn set_title(&self, title: &str) {
        let element = match self.title_element() {
            Some(element) => element,
            None => {
                let Some(head) = self.head() else {
                    tracing::debug!("文档没有 <head>，忽略标题设置");
                    return;
                };
                let element = create_element("title", &[]);
                self.append_child(&head, element.clone());
                element
            }
        };
        self.replace_children(&element, vec![create_text(title)]);
    }

    // ---- 会产生变更记录的写操作 ----

    /// 追加子节点；若子节点原本在别处，会先为原父节点记录一次移除
    pub fn append_child(&self, parent: &Handle, child: Handle) {
        self.record_move_out(&child);
        append(parent, child.clone());
        self.queue_record(parent.clone(), vec![child], Vec::new());
    }

    /// 在 `reference` 之前插入；`reference` 为空时等同于追加
    pub fn insert_before(&self, parent: &Handle, child: Handle, reference: Option<&Handle>) {
        let Some(reference) = reference else {
            self.append_child(parent, child);
            return;
        };
        self.record_move_out(&child);
        insert_before(parent, child.clone(), reference);
        self.queue_record(parent.clone(), vec![child], Vec::new());
    }

    /// 把节点从树中移除
    pub fn remove(&self, node: &Handle) {
        let Some(parent) = parent_of(node) else {
            return;
        };
        detach(node);
        self.queue_record(parent, Vec::new(), vec![node.clone()]);
    }

    /// 用 `children` 整体替换 `parent` 的子节点，返回被移除的旧子节点
    pub fn replace_children(&self, parent: &Handle, children: Vec<Handle>) -> Vec<Handle> {
        for child in children.iter() {
            self.record_move_out(child);
        }
        let removed = take_children(parent);
        for child in children.iter() {
            append(parent, child.clone());
        }

        if !removed.is_empty() || !children.is_empty() {
            self.queue_record(parent.clone(), children, removed.clone());
        }
        removed
    }

    /// 解析标记并替换 `node` 的全部子节点
    pub fn set_inner_html(&self, node: &Handle, markup: &str) {
        self.replace_children(node, parse_fragment(markup));
    }

    fn record_move_out(&self, child: &Handle) {
        if let Some(old_parent) = parent_of(child) {
            detach(child);
            self.queue_record(old_parent, Vec::new(), vec![child.clone()]);
        }
    }

    /// 在内部写入范围内执行 `write`
    ///
    /// 范围内产生的变更记录带有 `internal` 标记，观察者照常收到。
    pub fn internal_write<R>(&self, write: impl FnOnce() -> R) -> R {
        let depth = &self.inner.internal_depth;
        depth.set(depth.get() + 1);
        let _scope = InternalScope(depth);
        write()
    }

    fn queue_record(&self, target: Handle, added_nodes: Vec<Handle>, removed_nodes: Vec<Handle>) {
        let record = MutationRecord {
            target,
            added_nodes,
            removed_nodes,
            internal: self.inner.internal_depth.get() > 0,
        };
        let root = top_of(&record.target);
        let slots: Vec<Rc<MutationSlot>> = {
            let mut slots = self.inner.mutation_slots.borrow_mut();
            slots.retain(|slot| slot.strong_count() > 0);
            slots.iter().filter_map(Weak::upgrade).collect()
        };
        for slot in slots {
            slot.deliver(&root, &record);
        }
    }

    // ---- 影子根 ----

    /// 为元素挂载一个新的（开放的）影子根，并通知所有树根订阅者
    pub fn attach_shadow(&self, host: &Handle) -> Result<Handle, DomError> {
        let Some(name) = get_node_name(host) else {
            return Err(DomError::NotAnElement);
        };
        if self.shadow_root(host).is_some() {
            return Err(DomError::ShadowRootExists(name.to_string()));
        }

        let root = create_document_node();
        self.register_shadow(host, root.clone());
        tracing::debug!("<{}> 挂载了新的影子根", name);
        Ok(root)
    }

    fn register_shadow(&self, host: &Handle, root: Handle) {
        self.inner
            .shadow_roots
            .borrow_mut()
            .insert(NodeKey::of(host), (Rc::downgrade(host), root.clone()));
        self.inner
            .shadow_hosts
            .borrow_mut()
            .insert(NodeKey::of(&root), (Rc::downgrade(host), ()));

        self.inner
            .root_subscribers
            .borrow_mut()
            .retain(|subscriber| subscriber.send(root.clone()).is_ok());
    }

    fn attach_declarative_roots(&self, root: &Handle) {
        for element in descendant_elements(root) {
            if get_node_name(&element) != Some("template")
                || get_node_attr(&element, "shadowrootmode").is_none()
            {
                continue;
            }
            let Some(host) = parent_of(&element).filter(is_element) else {
                continue;
            };
            if self.shadow_root(&host).is_some() {
                continue;
            }

            let contents = match &element.data {
                NodeData::Element {
                    template_contents, ..
                } => template_contents.borrow_mut().take(),
                _ => None,
            };
            detach(&element);

            let shadow = contents.unwrap_or_else(create_document_node);
            self.register_shadow(&host, shadow.clone());
            self.attach_declarative_roots(&shadow);
        }
    }

    /// 元素上挂载的影子根
    pub fn shadow_root(&self, host: &Handle) -> Option<Handle> {
        self.inner
            .shadow_roots
            .borrow()
            .get(&NodeKey::of(host))
            .map(|(_, root)| root.clone())
    }

    /// 影子根的宿主元素
    pub fn shadow_host(&self, root: &Handle) -> Option<Handle> {
        self.inner
            .shadow_hosts
            .borrow()
            .get(&NodeKey::of(root))
            .and_then(|(host, _)| host.upgrade())
    }

    // ---- 观察者 ----

    pub fn mutation_observer(&self) -> (MutationObserver, ObserverReceiver<MutationRecord>) {
        let (observer, receiver, slot) = MutationObserver::new();
        self.inner
            .mutation_slots
            .borrow_mut()
            .push(Rc::downgrade(&slot));
        (observer, receiver)
    }

    pub fn intersection_observer(
        &self,
        threshold: f64,
    ) -> (IntersectionObserver, ObserverReceiver<IntersectionEntry>) {
        let (observer, receiver, slot) = IntersectionObserver::new(self.clone(), threshold);
        self.inner
            .intersection_slots
            .borrow_mut()
            .push(Rc::downgrade(&slot));
        (observer, receiver)
    }

    /// 由宿主报告节点当前的可见比例（0.0 ~ 1.0）
    pub fn set_visibility(&self, node: &Handle, ratio: f64) {
        let ratio = ratio.clamp(0.0, 1.0);
        self.inner
            .visibility
            .borrow_mut()
            .insert(NodeKey::of(node), (Rc::downgrade(node), ratio));

        let slots: Vec<Rc<IntersectionSlot>> = {
            let mut slots = self.inner.intersection_slots.borrow_mut();
            slots.retain(|slot| slot.strong_count() > 0);
            slots.iter().filter_map(Weak::upgrade).collect()
        };
        for slot in slots {
            slot.update(node, ratio);
        }
    }

    pub fn visibility(&self, node: &Handle) -> f64 {
        self.inner
            .visibility
            .borrow()
            .get(&NodeKey::of(node))
            .map(|(_, ratio)| *ratio)
            .unwrap_or(0.0)
    }

    /// 由宿主报告元素的渲染尺寸（像素）
    pub fn set_box_size(&self, node: &Handle, width: f64, height: f64) {
        self.inner
            .box_sizes
            .borrow_mut()
            .insert(NodeKey::of(node), (Rc::downgrade(node), (width, height)));
    }

    pub fn box_size(&self, node: &Handle) -> Option<(f64, f64)> {
        self.inner
            .box_sizes
            .borrow()
            .get(&NodeKey::of(node))
            .map(|(_, size)| *size)
    }

    // ---- 指针事件 ----

    pub fn add_event_listener(
        &self,
        node: &Handle,
        kind: PointerEventKind,
        listener: Listener,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);

        self.inner
            .listeners
            .borrow_mut()
            .entry(NodeKey::of(node))
            .or_insert_with(|| (Rc::downgrade(node), Vec::new()))
            .1
            .push(ListenerEntry { id, kind, listener });
        id
    }

    /// 解绑监听器，返回是否确实解绑了
    pub fn remove_event_listener(&self, node: &Handle, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let key = NodeKey::of(node);
        let Some((_, entries)) = listeners.get_mut(&key) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&key);
        }
        removed
    }

    pub fn listener_count(&self, node: &Handle) -> usize {
        self.inner
            .listeners
            .borrow()
            .get(&NodeKey::of(node))
            .map(|(_, entries)| entries.len())
            .unwrap_or(0)
    }

    /// 向节点派发指针事件
    ///
    /// 派发前先对监听器列表做快照，监听器可以在回调中解绑自己；
    /// 已被解绑的监听器不会再被调用。
    pub fn dispatch_pointer(&self, node: &Handle, kind: PointerEventKind, modifiers: Modifiers) {
        let key = NodeKey::of(node);
        let snapshot: Vec<(ListenerId, Listener)> = match self.inner.listeners.borrow().get(&key) {
            Some((_, entries)) => entries
                .iter()
                .filter(|entry| entry.kind == kind)
                .map(|entry| (entry.id, entry.listener.clone()))
                .collect(),
            None => return,
        };

        let event = PointerEvent {
            kind,
            target: node.clone(),
            modifiers,
        };
        for (id, listener) in snapshot {
            let still_bound = self
                .inner
                .listeners
                .borrow()
                .get(&key)
                .map(|(_, entries)| entries.iter().any(|entry| entry.id == id))
                .unwrap_or(false);
            if still_bound {
                listener(&event);
            }
        }
    }

    // ---- 输出 ----

    /// 序列化整个文档，影子根以声明式 `<template shadowrootmode="open">` 嵌回宿主
    pub fn to_html(&self) -> String {
        inner_html(&self.export(&self.inner.document))
    }

    fn export(&self, node: &Handle) -> Handle {
        let copy = shallow_clone(node);

        if let Some(root) = self.shadow_root(node) {
            let template = create_element("template", &[("shadowrootmode", "open")]);
            for child in root.children.borrow().iter() {
                append(&template, self.export(child));
            }
            append(&copy, template);
        }

        // rcdom 序列化不输出 template 内容，这里把内容作为普通子节点写出
        if let NodeData::Element {
            template_contents, ..
        } = &node.data
        {
            if let Some(contents) = template_contents.borrow().as_ref() {
                for child in contents.children.borrow().iter() {
                    append(&copy, self.export(child));
                }
            }
        }

        for child in node.children.borrow().iter() {
            append(&copy, self.export(child));
        }
        copy
    }
}

impl RootDiscovery for Page {
    fn subscribe_roots(&self) -> UnboundedReceiver<Handle> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.root_subscribers.borrow_mut().push(tx);
        rx
    }
}
