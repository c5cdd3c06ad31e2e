//! 渲染与生命周期集成测试
//!
//! 覆盖叠加/替换两种输出模式、恢复、失败处理、令牌过期和长度边界。

use std::cell::RefCell;
use std::rc::Rc;

use dom_translator::dom::{get_node_attr, get_node_name, outer_html};
use dom_translator::translator::{DisplayMode, Hooks, RulePatch, TextStyle, Trigger};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{engine, local, HtmlTestHelper, MockTranslator, Reply, RuleBuilder};

/// 叠加模式：译文写入宿主元素，受保护元素原样放回
#[tokio::test]
async fn test_overlay_render_restores_placeholders() {
    local(async {
        let backend = MockTranslator::identity().script("Hello [0]!", "你好 [0]！");
        let rule = RuleBuilder::new("p")
            .keep("b")
            .trigger(Trigger::Eager)
            .build();
        let translator = engine("<p id=\"p\">Hello <b>world</b>!</p>", rule, backend.clone());

        translator.register();
        translator.idle().await;

        let node = HtmlTestHelper::first(translator.page(), "#p");
        assert_eq!(backend.calls(), vec!["Hello [0]!".to_string()]);
        assert_eq!(
            HtmlTestHelper::host_html(&node).as_deref(),
            Some("你好 <b>world</b>！")
        );
        assert_eq!(HtmlTestHelper::host_style(&node).as_deref(), Some("fuzzy"));

        let stats = translator.stats();
        assert_eq!(stats.renders_applied, 1);
        assert_eq!(stats.characters_sent, "Hello [0]!".chars().count());
    })
    .await;
}

/// 替换模式：注销后子节点逐字节恢复
#[tokio::test]
async fn test_replace_mode_restores_original_markup() {
    local(async {
        let html = "<p id=\"p\">Read the <a href=\"/docs\">docs</a> first.</p>";
        let rule = RuleBuilder::new("p")
            .keep("a")
            .mode(DisplayMode::Replace)
            .build();
        let backend = MockTranslator::identity().script("Read the [0] first.", "请先阅读[0]。");
        let translator = engine(html, rule, backend);

        let node = HtmlTestHelper::first(translator.page(), "#p");
        let original = outer_html(&node);

        translator.register();
        translator.render(&node).await.unwrap();

        assert_eq!(
            outer_html(&node),
            "<p id=\"p\">请先阅读<a href=\"/docs\">docs</a>。</p>"
        );
        assert!(HtmlTestHelper::hosts(&node).is_empty());

        translator.unregister();
        assert_eq!(outer_html(&node), original);
    })
    .await;
}

/// 重复渲染替换模式节点时快照只保存一次
#[tokio::test]
async fn test_replace_snapshot_taken_once() {
    local(async {
        let html = "<p id=\"p\">Original text</p>";
        let rule = RuleBuilder::new("p").mode(DisplayMode::Replace).build();
        let translator = engine(html, rule, MockTranslator::numbered());
        let node = HtmlTestHelper::first(translator.page(), "#p");

        translator.register();
        translator.render(&node).await.unwrap();
        assert_eq!(outer_html(&node), "<p id=\"p\">第1次</p>");
        translator.render(&node).await.unwrap();
        assert_eq!(outer_html(&node), "<p id=\"p\">第2次</p>");

        translator.unregister();
        assert_eq!(outer_html(&node), html);
    })
    .await;
}

/// 翻译失败时不留下任何宿主元素
#[tokio::test]
async fn test_rejected_translation_leaves_no_host() {
    local(async {
        let rule = RuleBuilder::new("p").trigger(Trigger::Eager).build();
        let translator = engine(
            "<p id=\"a\">First paragraph</p><p id=\"b\">Second paragraph</p>",
            rule,
            MockTranslator::rejecting(),
        );
        let before = outer_html(&HtmlTestHelper::first(translator.page(), "#a"));

        translator.register();
        translator.idle().await;

        let node = HtmlTestHelper::first(translator.page(), "#a");
        assert!(HtmlTestHelper::hosts(&node).is_empty());
        assert_eq!(outer_html(&node), before);

        let stats = translator.stats();
        assert_eq!(stats.renders_failed, 2);
        assert_eq!(stats.renders_applied, 0);
        assert_eq!(translator.in_flight(), 0);
    })
    .await;
}

/// 空白译文按失败处理
#[tokio::test]
async fn test_blank_translation_counts_as_failure() {
    local(async {
        let translator = engine(
            "<p id=\"p\">Some text</p>",
            RuleBuilder::new("p").build(),
            MockTranslator::new(Reply::Empty),
        );
        let node = HtmlTestHelper::first(translator.page(), "#p");

        translator.register();
        translator.render(&node).await.unwrap();

        assert!(HtmlTestHelper::hosts(&node).is_empty());
        assert_eq!(translator.stats().renders_failed, 1);
    })
    .await;
}

/// 只有最新一次渲染的结果会被写回
#[tokio::test]
async fn test_stale_result_is_discarded() {
    local(async {
        let backend = MockTranslator::numbered();
        let first_gate = backend.gate();
        let second_gate = backend.gate();
        let translator = engine(
            "<p id=\"p\">Racing paragraph</p>",
            RuleBuilder::new("p").build(),
            backend.clone(),
        );
        let node = HtmlTestHelper::first(translator.page(), "#p");

        translator.register();
        let first = translator.render(&node);
        let second = translator.render(&node);

        second_gate.send(()).unwrap();
        second.await.unwrap();
        assert_eq!(HtmlTestHelper::host_html(&node).as_deref(), Some("第2次"));

        first_gate.send(()).unwrap();
        first.await.unwrap();

        assert_eq!(HtmlTestHelper::hosts(&node).len(), 1);
        assert_eq!(HtmlTestHelper::host_html(&node).as_deref(), Some("第2次"));
        let stats = translator.stats();
        assert_eq!(stats.renders_applied, 1);
        assert_eq!(stats.renders_stale, 1);
        assert_eq!(backend.call_count(), 2);
    })
    .await;
}

/// 注销后才返回的结果被丢弃
#[tokio::test]
async fn test_result_after_unregister_is_dropped() {
    local(async {
        let backend = MockTranslator::prefixed("译:");
        let gate = backend.gate();
        let translator = engine(
            "<p id=\"p\">Slow paragraph</p>",
            RuleBuilder::new("p").build(),
            backend,
        );
        let node = HtmlTestHelper::first(translator.page(), "#p");
        let original = outer_html(&node);

        translator.register();
        let pending = translator.render(&node);
        translator.unregister();

        gate.send(()).unwrap();
        pending.await.unwrap();

        assert_eq!(outer_html(&node), original);
        assert_eq!(translator.stats().renders_stale, 1);
    })
    .await;
}

/// 重复注销无副作用
#[tokio::test]
async fn test_double_unregister_is_noop() {
    local(async {
        let rule = RuleBuilder::new("p; li")
            .trigger(Trigger::Eager)
            .with(|rule| rule.select_style = Some("outline: 1px solid red".to_string()))
            .build();
        let html = HtmlTestHelper::create_simple_english_page();
        let translator = engine(&html, rule, MockTranslator::prefixed("译:"));
        let body = translator.page().body().expect("body");
        let original = outer_html(&body);

        translator.register();
        translator.idle().await;
        assert_ne!(outer_html(&body), original);

        translator.unregister();
        let restored = outer_html(&body);
        translator.unregister();

        assert!(!translator.is_registered());
        assert_eq!(restored, original);
        assert_eq!(outer_html(&body), original);
        assert!(translator.tracked_nodes().is_empty());
    })
    .await;
}

/// 重复注册被忽略
#[tokio::test]
async fn test_register_is_idempotent() {
    local(async {
        let backend = MockTranslator::identity();
        let rule = RuleBuilder::new("p").trigger(Trigger::Eager).build();
        let translator = engine("<p>Only once please</p>", rule, backend.clone());

        translator.register();
        translator.register();
        translator.idle().await;

        assert_eq!(translator.tracked_nodes().len(), 1);
        assert_eq!(backend.call_count(), 1);
    })
    .await;
}

/// 长度越界和空文本的节点从不发送给翻译服务
#[tokio::test]
async fn test_length_bounds_are_never_sent() {
    local(async {
        let backend = MockTranslator::identity();
        let rule = RuleBuilder::new("p")
            .trigger(Trigger::Eager)
            .bounds(5, 20)
            .build();
        let translator = engine(
            "<p>Hi</p><p>This one is fine</p><p>This paragraph is far too long to send</p><p>   </p>",
            rule,
            backend.clone(),
        );

        translator.register();
        translator.idle().await;

        assert_eq!(backend.calls(), vec!["This one is fine".to_string()]);
        let stats = translator.stats();
        assert_eq!(stats.renders_skipped, 3);
        assert_eq!(stats.renders_applied, 1);
    })
    .await;
}

/// 候选选择遵循跳过标签和外层优先
#[tokio::test]
async fn test_collect_targets_skips_and_collapses() {
    local(async {
        let html = HtmlTestHelper::create_simple_english_page();
        let translator = engine(
            &html,
            RuleBuilder::new("h1; p; li; ul; button; script").build(),
            MockTranslator::identity(),
        );

        let ids: Vec<String> = translator
            .collect_targets()
            .iter()
            .map(|node| {
                get_node_attr(node, "id")
                    .unwrap_or_else(|| get_node_name(node).unwrap_or_default().to_string())
            })
            .collect();

        assert_eq!(ids, vec!["title", "intro", "ul"]);
    })
    .await;
}

/// 影子根中的候选与主文档一样被跟踪和渲染
#[tokio::test]
async fn test_shadow_candidates_are_rendered() {
    local(async {
        let html = HtmlTestHelper::create_shadow_page();
        let rule = RuleBuilder::new("p; my-card::shadow::p")
            .trigger(Trigger::Eager)
            .build();
        let translator = engine(&html, rule, MockTranslator::prefixed("译:"));

        translator.register();
        translator.idle().await;

        let page = translator.page();
        let card = HtmlTestHelper::first(page, "#card");
        let shadow = page.shadow_root(&card).expect("shadow root");

        assert_eq!(translator.roots().len(), 2);
        assert_eq!(translator.tracked_nodes().len(), 2);
        assert_eq!(HtmlTestHelper::hosts(&shadow).len(), 1);
        assert!(dom_translator::translator::style::has_styles(&shadow));

        let outer = HtmlTestHelper::first(page, "#outer");
        assert_eq!(
            HtmlTestHelper::host_html(&outer).as_deref(),
            Some("译:Light paragraph text")
        );
    })
    .await;
}

/// 未注册时也可以翻译单个元素
#[tokio::test]
async fn test_translate_element_without_register() {
    local(async {
        let translator = engine(
            "<div id=\"d\">Standalone block</div>",
            RuleBuilder::new("p").build(),
            MockTranslator::prefixed("译:"),
        );
        let node = HtmlTestHelper::first(translator.page(), "#d");

        translator.translate_element(&node).await;

        assert!(!translator.is_registered());
        assert!(translator.tracked_nodes().is_empty());
        assert_eq!(
            HtmlTestHelper::host_html(&node).as_deref(),
            Some("译:Standalone block")
        );
        assert!(translator.page().to_html().contains("id=\"kt-trans-css\""));
    })
    .await;
}

/// 样式切换就地更新所有宿主元素
#[tokio::test]
async fn test_toggle_style_updates_hosts() {
    local(async {
        let rule = RuleBuilder::new("p").trigger(Trigger::Eager).build();
        let translator = engine(
            "<p id=\"a\">Alpha text</p><p id=\"b\">Beta text</p>",
            rule,
            MockTranslator::identity(),
        );

        translator.register();
        translator.idle().await;

        assert_eq!(translator.toggle_style(), TextStyle::Dashline);
        for id in ["#a", "#b"] {
            let node = HtmlTestHelper::first(translator.page(), id);
            assert_eq!(HtmlTestHelper::host_style(&node).as_deref(), Some("dashline"));
        }
        assert_eq!(translator.toggle_style(), TextStyle::Fuzzy);
    })
    .await;
}

/// 宿主回调在渲染开始和节点恢复时被调用
#[tokio::test]
async fn test_hooks_observe_render_and_restore() {
    local(async {
        let started = Rc::new(RefCell::new(Vec::new()));
        let removed = Rc::new(RefCell::new(0usize));

        let hooks = {
            let started = started.clone();
            let removed = removed.clone();
            Hooks::new()
                .on_render_start(move |_, text| started.borrow_mut().push(text.to_string()))
                .on_remove(move |_| *removed.borrow_mut() += 1)
        };

        let rule = RuleBuilder::new("p").trigger(Trigger::Eager).build();
        let translator = engine(
            "<p>  Hooked paragraph  </p><p>Another one</p>",
            rule,
            MockTranslator::identity(),
        )
        .with_hooks(hooks);

        translator.register();
        translator.idle().await;
        translator.unregister();

        assert_eq!(
            *started.borrow(),
            vec!["Hooked paragraph".to_string(), "Another one".to_string()]
        );
        assert_eq!(*removed.borrow(), 2);
    })
    .await;
}

/// 候选及其父元素上的内联样式在注销时还原
#[tokio::test]
async fn test_candidate_styles_are_restored() {
    local(async {
        let html = "<div id=\"wrap\" style=\"color: red\"><p id=\"p\">Styled paragraph</p></div>";
        let rule = RuleBuilder::new("p")
            .with(|rule| {
                rule.select_style = Some("outline: 1px dashed".to_string());
                rule.parent_style = Some("padding: 2px".to_string());
            })
            .build();
        let translator = engine(html, rule, MockTranslator::identity());
        let wrap = HtmlTestHelper::first(translator.page(), "#wrap");
        let original = outer_html(&wrap);

        translator.register();
        let styled = outer_html(&wrap);
        assert!(styled.contains("outline: 1px dashed"));
        assert!(styled.contains("padding: 2px"));

        translator.unregister();
        assert_eq!(outer_html(&wrap), original);
    })
    .await;
}

/// 标题以 "译文 | 原文" 形式显示，注销后还原
#[tokio::test]
async fn test_title_translation_round_trip() {
    local(async {
        let backend = MockTranslator::identity().script("Test Page", "测试页面");
        let rule = RuleBuilder::new("h1")
            .with(|rule| rule.translate_title = true)
            .build();
        let html = HtmlTestHelper::create_simple_english_page();
        let translator = engine(&html, rule, backend);

        translator.register();
        translator.idle().await;
        assert_eq!(translator.page().title().as_deref(), Some("测试页面 | Test Page"));

        translator.unregister();
        assert_eq!(translator.page().title().as_deref(), Some("Test Page"));
    })
    .await;
}

/// 无效的规则补丁被拒绝，规则保持不变
#[tokio::test]
async fn test_invalid_rule_patch_is_rejected() {
    local(async {
        let translator = engine(
            "<p>Patch me</p>",
            RuleBuilder::new("p").build(),
            MockTranslator::identity(),
        );
        let before = translator.rule();

        let patch = RulePatch {
            min_len: Some(50),
            max_len: Some(10),
            ..RulePatch::default()
        };
        assert!(translator.update_rule(patch).is_err());

        let patch = RulePatch {
            selector: Some("p:hover".to_string()),
            ..RulePatch::default()
        };
        assert!(translator.update_rule(patch).is_err());

        assert_eq!(translator.rule(), before);
        assert!(!translator.rescan_pending());
    })
    .await;
}

/// 全部翻译会解除触发器并立即渲染
#[tokio::test]
async fn test_translate_all_renders_every_tracked_node() {
    local(async {
        let backend = MockTranslator::prefixed("译:");
        let rule = RuleBuilder::new("p; li")
            .trigger(Trigger::OnHover)
            .build();
        let html = HtmlTestHelper::create_simple_english_page();
        let translator = engine(&html, rule, backend.clone());

        translator.register();
        let intro = HtmlTestHelper::first(translator.page(), "#intro");
        assert_eq!(translator.page().listener_count(&intro), 2);

        let tasks = translator.translate_all();
        assert_eq!(tasks.len(), 3);
        tasks.settled().await;

        assert_eq!(translator.page().listener_count(&intro), 0);
        assert_eq!(backend.call_count(), 3);
        assert_eq!(translator.stats().renders_applied, 3);
        assert!(backend.calls().contains(&"Second item() here".to_string()));
    })
    .await;
}
