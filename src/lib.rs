//! # DOM Translator Library
//!
//! 页面内翻译引擎：在一棵持续变化的 HTML 文档树上选择可翻译节点，
//! 调用翻译后端，并把译文以叠加或替换的方式写回文档，随时可以完整恢复。
//!
//! ## 模块组织
//!
//! - `dom` - 活动文档模型（解析、序列化、选择器、影子根、观察者）
//! - `translator` - 翻译引擎（候选选择、占位符编码、渲染、触发、生命周期）
//! - `env` - 环境变量管理
//!
//! 引擎是单线程的，所有异步任务都用 `tokio::task::spawn_local` 启动：
//!
//! ```no_run
//! use dom_translator::dom::Page;
//! use dom_translator::translator::{DomTranslator, FnTranslator, Rule, Setting, TranslatorResult};
//!
//! # async fn run() -> TranslatorResult<()> {
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let page = Page::parse("<p>Hello world</p>");
//!         let backend = FnTranslator::new(|text: String| async move {
//!             TranslatorResult::Ok(text.to_uppercase())
//!         });
//!         let translator = DomTranslator::new(page, Rule::default(), Setting::default(), backend)?;
//!         translator.register();
//!         translator.translate_all().settled().await;
//!         println!("{}", translator.page().to_html());
//!         TranslatorResult::Ok(())
//!     })
//!     .await
//! # }
//! ```

pub mod dom;
pub mod env;
pub mod translator;

// Re-export commonly used items for convenience
pub use dom::{Page, RootDiscovery};
pub use translator::{
    ControlMessage, DisplayMode, DomTranslator, FnTranslator, Hooks, HttpTranslator, Rule,
    RulePatch, Setting, Translate, TranslatorConfig, TranslatorError, TranslatorResult, Trigger,
};
