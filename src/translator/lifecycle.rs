//! 翻译引擎生命周期
//!
//! `DomTranslator` 是引擎的对外入口。所有状态都在单个逻辑线程上，
//! 通过 `Rc<RefCell<..>>` 共享；异步任务用 `spawn_local` 启动，
//! 因此必须在 `tokio::task::LocalSet` 中使用。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, WeakHandle};
use tokio::task::JoinHandle;

use crate::dom::node::{append_inline_style, get_node_attr, is_element, parent_of, set_node_attr};
use crate::dom::{NodeKey, Page};
use crate::translator::backend::Translate;
use crate::translator::config::constants::HOST_STYLE_ATTR;
use crate::translator::config::{
    CompiledRule, Rule, RulePatch, Setting, TextStyle, TranslatorConfig, Trigger,
};
use crate::translator::error::TranslatorResult;
use crate::translator::observer::{HoverBinding, MutationWatch, RescanScheduler, VisibilityWatch};
use crate::translator::render::{
    hosts_under, EngineStats, InFlight, RenderTasks, StatsSnapshot, TrackingMap, UntrackedTokens,
};
use crate::translator::style::ensure_styles;
use crate::translator::targets::shadow_roots_in;

type RenderStartHook = Rc<dyn Fn(&Handle, &str)>;
type RemoveHook = Rc<dyn Fn(&Handle)>;

/// 宿主插桩回调
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) on_render_start: Option<RenderStartHook>,
    pub(crate) on_remove: Option<RemoveHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 渲染开始前调用，参数为节点及其原始文本
    pub fn on_render_start(mut self, hook: impl Fn(&Handle, &str) + 'static) -> Self {
        self.on_render_start = Some(Rc::new(hook));
        self
    }

    /// 节点恢复后调用
    pub fn on_remove(mut self, hook: impl Fn(&Handle) + 'static) -> Self {
        self.on_remove = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_render_start", &self.on_render_start.is_some())
            .field("on_remove", &self.on_remove.is_some())
            .finish()
    }
}

struct TitleState {
    original: String,
    token: u64,
    applied: bool,
}

pub(crate) struct EngineState {
    pub(crate) rule: Rule,
    pub(crate) compiled: CompiledRule,
    pub(crate) setting: Setting,
    pub(crate) registered: bool,
    pub(crate) roots: Vec<Handle>,
    pub(crate) tracking: TrackingMap,
    pub(crate) untracked: UntrackedTokens,
    pub(crate) visibility: Option<VisibilityWatch>,
    pub(crate) mutations: Option<MutationWatch>,
    pub(crate) hover: HashMap<NodeKey, HoverBinding>,
    pub(crate) root_hook: Option<JoinHandle<()>>,
    /// 追加 `parent_style` 之前各父元素的 `style` 属性
    parent_styles: HashMap<NodeKey, (WeakHandle, Option<String>)>,
    title: Option<TitleState>,
}

pub(crate) struct Engine {
    pub(crate) page: Page,
    pub(crate) backend: Rc<dyn Translate>,
    pub(crate) hooks: RefCell<Hooks>,
    pub(crate) stats: EngineStats,
    pub(crate) in_flight: Rc<InFlight>,
    pub(crate) rescan: RescanScheduler,
    pub(crate) state: RefCell<EngineState>,
    last_token: Cell<u64>,
}

impl Engine {
    /// 签发新的请求令牌，严格递增
    pub(crate) fn next_token(&self) -> u64 {
        let token = self.last_token.get() + 1;
        self.last_token.set(token);
        token
    }

    pub(crate) fn register_inner(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.registered {
                tracing::debug!("已经注册，忽略重复注册");
                return;
            }
            state.registered = true;
        }
        self.install_root_hook();

        let document = self.page.document();
        let host_tag = self.state.borrow().setting.host_tag.clone();
        ensure_styles(&self.page, &document, &host_tag);
        self.scan_root(&document);
        self.observe_roots();

        let (trigger, translate_title, tracked, roots) = {
            let state = self.state.borrow();
            (
                state.rule.trigger,
                state.rule.translate_title,
                state.tracking.nodes(),
                state.roots.len(),
            )
        };
        tracing::info!(
            "注册完成：{} 个树根，{} 个候选节点，触发策略 {}",
            roots,
            tracked.len(),
            trigger
        );

        if trigger == Trigger::Eager {
            for node in tracked.iter() {
                self.start_render(node);
            }
        }
        if translate_title {
            self.translate_title();
        }
    }

    /// 扫描一个树根并递归进入其中的影子根
    fn scan_root(self: &Rc<Self>, root: &Handle) {
        let (selector, setting, select_style, parent_style) = {
            let mut state = self.state.borrow_mut();
            if state.roots.iter().any(|r| Rc::ptr_eq(r, root)) {
                return;
            }
            state.roots.push(root.clone());
            (
                state.compiled.selector.clone(),
                state.setting.clone(),
                state.rule.select_style.clone(),
                state.rule.parent_style.clone(),
            )
        };

        if !Rc::ptr_eq(root, &self.page.document()) {
            ensure_styles(&self.page, root, &setting.host_tag);
        }

        let targets = selector.collect(&self.page, root, &setting);
        tracing::debug!("树根中找到 {} 个候选节点", targets.len());
        for node in targets.iter() {
            if !self.state.borrow_mut().tracking.insert(node) {
                continue;
            }
            self.apply_candidate_styles(node, select_style.as_deref(), parent_style.as_deref());
            self.arm_trigger(node);
        }

        for shadow in shadow_roots_in(&self.page, root) {
            self.scan_root(&shadow);
        }
    }

    fn apply_candidate_styles(
        &self,
        node: &Handle,
        select_style: Option<&str>,
        parent_style: Option<&str>,
    ) {
        let mut state = self.state.borrow_mut();

        if let Some(style) = select_style {
            let backup = get_node_attr(node, "style");
            append_inline_style(node, style);
            if let Some(entry) = state.tracking.get_mut(node) {
                entry.style_backup = Some(backup);
            }
        }

        if let Some(style) = parent_style {
            let Some(parent) = parent_of(node).filter(is_element) else {
                return;
            };
            let key = NodeKey::of(&parent);
            if !state.parent_styles.contains_key(&key) {
                let backup = get_node_attr(&parent, "style");
                append_inline_style(&parent, style);
                state
                    .parent_styles
                    .insert(key, (Rc::downgrade(&parent), backup));
            }
        }
    }

    fn restore_parent_styles(&self) {
        let parents = std::mem::take(&mut self.state.borrow_mut().parent_styles);
        for (parent, backup) in parents.into_values() {
            if let Some(parent) = parent.upgrade() {
                set_node_attr(&parent, "style", backup);
            }
        }
    }

    pub(crate) fn unregister_inner(&self, cancel_rescan: bool) {
        if cancel_rescan {
            self.rescan.cancel();
        }
        let was_registered = std::mem::replace(&mut self.state.borrow_mut().registered, false);

        self.stop_observing_roots();
        self.disarm_all();
        self.restore_tracked();
        self.restore_parent_styles();
        self.restore_title();
        self.state.borrow_mut().roots.clear();

        if was_registered {
            tracing::info!("已注销，页面内容已恢复");
        }
    }

    fn translate_title(self: &Rc<Self>) {
        let Some(original) = self.page.title() else {
            return;
        };
        let text = original.trim().to_string();
        if text.is_empty() {
            return;
        }

        let token = self.next_token();
        self.state.borrow_mut().title = Some(TitleState {
            original: original.clone(),
            token,
            applied: false,
        });

        let guard = self.in_flight.enter();
        let engine = self.clone();
        tokio::task::spawn_local(async move {
            let _guard = guard;
            match engine.backend.translate(&text).await {
                Ok(translated) if !translated.trim().is_empty() => {
                    let current = match engine.state.borrow_mut().title.as_mut() {
                        Some(title) if title.token == token => {
                            title.applied = true;
                            true
                        }
                        _ => false,
                    };
                    if current {
                        let title = format!("{} | {}", translated.trim(), text);
                        engine
                            .page
                            .internal_write(|| engine.page.set_title(&title));
                    } else {
                        tracing::debug!("标题翻译结果已过期");
                    }
                }
                Ok(_) => tracing::warn!("标题翻译结果为空"),
                Err(err) => tracing::warn!("标题翻译失败: {}", err),
            }
        });
    }

    fn restore_title(&self) {
        let title = self.state.borrow_mut().title.take();
        if let Some(title) = title.filter(|title| title.applied) {
            self.page
                .internal_write(|| self.page.set_title(&title.original));
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.rescan.cancel();
        if let Some(hook) = self.state.get_mut().root_hook.take() {
            hook.abort();
        }
    }
}

/// 页面内翻译引擎
pub struct DomTranslator {
    engine: Rc<Engine>,
}

impl DomTranslator {
    /// 创建引擎；规则和参数在此验证，之后的公开操作不再失败
    pub fn new<T>(page: Page, rule: Rule, setting: Setting, backend: T) -> TranslatorResult<Self>
    where
        T: Translate + 'static,
    {
        rule.validate()?;
        setting.validate()?;
        let compiled = rule.compile()?;

        let engine = Engine {
            page,
            backend: Rc::new(backend),
            hooks: RefCell::new(Hooks::default()),
            stats: EngineStats::default(),
            in_flight: Rc::new(InFlight::default()),
            rescan: RescanScheduler::default(),
            state: RefCell::new(EngineState {
                rule,
                compiled,
                setting,
                registered: false,
                roots: Vec::new(),
                tracking: TrackingMap::default(),
                untracked: UntrackedTokens::default(),
                visibility: None,
                mutations: None,
                hover: HashMap::new(),
                root_hook: None,
                parent_styles: HashMap::new(),
                title: None,
            }),
            last_token: Cell::new(0),
        };

        Ok(Self {
            engine: Rc::new(engine),
        })
    }

    /// 按完整配置创建
    pub fn from_config<T>(page: Page, config: &TranslatorConfig, backend: T) -> TranslatorResult<Self>
    where
        T: Translate + 'static,
    {
        Self::new(page, config.rule.clone(), config.setting.clone(), backend)
    }

    pub fn with_hooks(self, hooks: Hooks) -> Self {
        self.set_hooks(hooks);
        self
    }

    pub fn set_hooks(&self, hooks: Hooks) {
        *self.engine.hooks.borrow_mut() = hooks;
    }

    pub fn page(&self) -> &Page {
        &self.engine.page
    }

    pub fn rule(&self) -> Rule {
        self.engine.state.borrow().rule.clone()
    }

    pub fn setting(&self) -> Setting {
        self.engine.state.borrow().setting.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.engine.state.borrow().registered
    }

    /// 注入样式、扫描全部树根并开始观察
    pub fn register(&self) {
        self.engine.register_inner();
    }

    /// 停止观察并恢复全部被跟踪的节点；未注册或重复调用时无效果
    pub fn unregister(&self) {
        self.engine.unregister_inner(true);
    }

    /// 合并规则补丁并安排一次重扫描
    ///
    /// 补丁无效时返回错误，引擎状态保持不变。
    pub fn update_rule(&self, patch: RulePatch) -> TranslatorResult<()> {
        let mut rule = self.rule();
        rule.merge(patch);
        rule.validate()?;
        let compiled = rule.compile()?;

        let registered = {
            let mut state = self.engine.state.borrow_mut();
            state.rule = rule;
            state.compiled = compiled;
            state.registered
        };
        tracing::info!("规则已更新");
        if registered {
            self.engine.schedule_rescan(false);
        }
        Ok(())
    }

    /// 切换译文样式并就地更新所有宿主元素，返回新样式
    pub fn toggle_style(&self) -> TextStyle {
        let (next, mut roots, host_tag) = {
            let mut state = self.engine.state.borrow_mut();
            state.rule.text_style = state.rule.text_style.toggled();
            (
                state.rule.text_style,
                state.roots.clone(),
                state.setting.host_tag.clone(),
            )
        };

        let document = self.engine.page.document();
        if !roots.iter().any(|r| Rc::ptr_eq(r, &document)) {
            roots.push(document);
        }
        for root in roots.iter() {
            for host in hosts_under(root, &host_tag) {
                set_node_attr(&host, HOST_STYLE_ATTR, Some(next.as_str().to_string()));
            }
        }
        tracing::debug!("译文样式切换为 {}", next);
        next
    }

    /// 按当前规则在已知树根中解析候选节点（不登记）
    pub fn collect_targets(&self) -> Vec<Handle> {
        let (selector, setting, mut roots) = {
            let state = self.engine.state.borrow();
            (
                state.compiled.selector.clone(),
                state.setting.clone(),
                state.roots.clone(),
            )
        };
        if roots.is_empty() {
            roots.push(self.engine.page.document());
        }
        roots
            .iter()
            .flat_map(|root| selector.collect(&self.engine.page, root, &setting))
            .collect()
    }

    /// 当前被跟踪的节点
    pub fn tracked_nodes(&self) -> Vec<Handle> {
        self.engine.state.borrow().tracking.nodes()
    }

    /// 当前已知的树根
    pub fn roots(&self) -> Vec<Handle> {
        self.engine.state.borrow().roots.clone()
    }

    /// 渲染单个节点，返回异步完成阶段的任务句柄
    pub fn render(&self, node: &Handle) -> JoinHandle<()> {
        self.engine.start_render(node)
    }

    /// 立即渲染全部被跟踪的节点，不论触发策略
    pub fn translate_all(&self) -> RenderTasks {
        let nodes = self.tracked_nodes();
        tracing::info!("翻译全部 {} 个节点", nodes.len());

        let handles = nodes
            .iter()
            .map(|node| {
                self.engine.disarm_trigger(node);
                self.engine.start_render(node)
            })
            .collect();
        RenderTasks::new(handles)
    }

    /// 翻译单个元素并等待结果，不需要先注册
    pub async fn translate_element(&self, node: &Handle) {
        let host_tag = self.engine.state.borrow().setting.host_tag.clone();
        ensure_styles(&self.engine.page, &self.engine.page.document(), &host_tag);

        if let Err(err) = self.engine.start_render(node).await {
            tracing::warn!("单节点翻译任务异常结束: {}", err);
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats.snapshot()
    }

    /// 进行中的渲染与标题任务数
    pub fn in_flight(&self) -> usize {
        self.engine.in_flight.count()
    }

    /// 是否有尚未执行的重扫描
    pub fn rescan_pending(&self) -> bool {
        self.engine.rescan.is_pending()
    }

    /// 等待所有进行中的渲染与标题任务结束
    pub async fn idle(&self) {
        self.engine.in_flight.idle().await;
    }
}

impl fmt::Debug for DomTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.engine.state.borrow();
        f.debug_struct("DomTranslator")
            .field("registered", &state.registered)
            .field("roots", &state.roots.len())
            .field("tracked", &state.tracking.len())
            .field("rule", &state.rule)
            .finish()
    }
}
