// 集成测试公共模块
//
// 提供测试辅助工具和共享功能

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;

use async_trait::async_trait;
use markup5ever_rcdom::Handle;
use tokio::sync::oneshot;

use dom_translator::dom::node::{descendant_elements, get_node_attr, get_node_name};
use dom_translator::dom::{inner_html, Page};
use dom_translator::translator::{
    DisplayMode, DomTranslator, Rule, Setting, Translate, TranslatorError, TranslatorResult,
    Trigger,
};

/// 在 `LocalSet` 中运行测试体，引擎的任务都通过 `spawn_local` 启动
pub async fn local<F: Future>(body: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(body).await
}

/// 模拟翻译服务的应答方式
#[derive(Debug, Clone)]
pub enum Reply {
    /// 原样返回
    Identity,
    /// 在原文前加前缀
    Prefix(String),
    /// 返回 "第N次"，N 为调用序号（从 1 开始）
    Numbered,
    /// 返回空白结果
    Empty,
    /// 一律失败
    Reject,
}

struct MockInner {
    reply: RefCell<Reply>,
    scripted: RefCell<HashMap<String, String>>,
    gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    calls: RefCell<Vec<String>>,
    counter: Cell<usize>,
}

/// 可编排的翻译后端；克隆共享同一份状态，便于在引擎接管后继续检查
#[derive(Clone)]
pub struct MockTranslator {
    inner: Rc<MockInner>,
}

impl MockTranslator {
    pub fn new(reply: Reply) -> Self {
        Self {
            inner: Rc::new(MockInner {
                reply: RefCell::new(reply),
                scripted: RefCell::new(HashMap::new()),
                gates: RefCell::new(VecDeque::new()),
                calls: RefCell::new(Vec::new()),
                counter: Cell::new(0),
            }),
        }
    }

    pub fn identity() -> Self {
        Self::new(Reply::Identity)
    }

    pub fn prefixed(prefix: &str) -> Self {
        Self::new(Reply::Prefix(prefix.to_string()))
    }

    pub fn numbered() -> Self {
        Self::new(Reply::Numbered)
    }

    pub fn rejecting() -> Self {
        Self::new(Reply::Reject)
    }

    /// 为指定原文设置固定译文，优先于默认应答
    pub fn script(self, source: &str, translated: &str) -> Self {
        self.inner
            .scripted
            .borrow_mut()
            .insert(source.to_string(), translated.to_string());
        self
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.inner.reply.borrow_mut() = reply;
    }

    /// 让下一次尚未取得闸门的调用挂起，直到返回的发送端被触发或丢弃
    pub fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.gates.borrow_mut().push_back(rx);
        tx
    }

    /// 按调用顺序记录的原文
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.borrow().len()
    }
}

#[async_trait(?Send)]
impl Translate for MockTranslator {
    async fn translate(&self, text: &str) -> TranslatorResult<String> {
        self.inner.calls.borrow_mut().push(text.to_string());
        let number = self.inner.counter.get() + 1;
        self.inner.counter.set(number);

        let gate = self.inner.gates.borrow_mut().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if let Some(scripted) = self.inner.scripted.borrow().get(text) {
            return Ok(scripted.clone());
        }
        let reply = self.inner.reply.borrow().clone();
        match reply {
            Reply::Identity => Ok(text.to_string()),
            Reply::Prefix(prefix) => Ok(format!("{}{}", prefix, text)),
            Reply::Numbered => Ok(format!("第{}次", number)),
            Reply::Empty => Ok("   ".to_string()),
            Reply::Reject => Err(TranslatorError::Network("mock backend is down".to_string())),
        }
    }
}

/// HTML 测试辅助工具
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    /// 包含段落、列表、受保护元素和不参与翻译元素的简单页面
    pub fn create_simple_english_page() -> String {
        r#"<!DOCTYPE html>
<html>
<head><title>Test Page</title></head>
<body>
    <h1 id="title">Welcome to Test</h1>
    <p id="intro">This is a test paragraph.</p>
    <ul>
        <li id="one">First item</li>
        <li id="two">Second <code>item()</code> here</li>
    </ul>
    <script>var untouched = "script";</script>
    <button id="btn">Click me</button>
</body>
</html>"#
            .to_string()
    }

    /// 包含声明式影子根的页面
    pub fn create_shadow_page() -> String {
        r#"<html><head></head><body>
<my-card id="card"><template shadowrootmode="open"><p id="inner">Shadow paragraph text</p></template></my-card>
<p id="outer">Light paragraph text</p>
</body></html>"#
            .to_string()
    }

    pub fn first(page: &Page, selector: &str) -> Handle {
        page.query_selector(selector)
            .expect("selector should parse")
            .unwrap_or_else(|| panic!("no element matches '{}'", selector))
    }

    /// `node` 子树中的宿主元素
    pub fn hosts(node: &Handle) -> Vec<Handle> {
        descendant_elements(node)
            .into_iter()
            .filter(|el| get_node_name(el) == Some("x-kt-trans"))
            .collect()
    }

    /// 节点唯一宿主元素的内部标记
    pub fn host_html(node: &Handle) -> Option<String> {
        let hosts = Self::hosts(node);
        assert!(hosts.len() <= 1, "expected at most one host, got {}", hosts.len());
        hosts.first().map(inner_html)
    }

    pub fn host_style(node: &Handle) -> Option<String> {
        Self::hosts(node)
            .first()
            .and_then(|host| get_node_attr(host, "data-style"))
    }
}

/// 规则构建器
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    pub fn new(selector: &str) -> Self {
        Self {
            rule: Rule {
                keep_selector: None,
                trigger: Trigger::Manual,
                ..Rule::with_selector(selector)
            },
        }
    }

    pub fn keep(mut self, keep: &str) -> Self {
        self.rule.keep_selector = Some(keep.to_string());
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.rule.trigger = trigger;
        self
    }

    pub fn mode(mut self, mode: DisplayMode) -> Self {
        self.rule.display_mode = mode;
        self
    }

    pub fn bounds(mut self, min_len: usize, max_len: usize) -> Self {
        self.rule.min_len = min_len;
        self.rule.max_len = max_len;
        self
    }

    pub fn with(mut self, edit: impl FnOnce(&mut Rule)) -> Self {
        edit(&mut self.rule);
        self
    }

    pub fn build(self) -> Rule {
        self.rule
    }
}

/// 用默认参数创建引擎
pub fn engine(html: &str, rule: Rule, backend: MockTranslator) -> DomTranslator {
    DomTranslator::new(Page::parse(html), rule, Setting::default(), backend)
        .expect("engine should build")
}
