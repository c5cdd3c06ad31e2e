//! 控制消息、用户偏好、划词翻译与配置加载集成测试

use dom_translator::dom::{outer_html, Page};
use dom_translator::translator::{
    dispatch, ConfigManager, ControlMessage, DisplayMode, DomTranslator, MessageOutcome,
    SelectionOutcome, SelectionTranslator, SettingsStore, SkipReason, TextStyle, Trigger,
};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{engine, local, HtmlTestHelper, MockTranslator, RuleBuilder};

fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "dom-translator-it-{}-{}",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// 启用、翻译单个元素、禁用的完整消息流程
#[tokio::test]
async fn test_message_flow() {
    local(async {
        let rule = RuleBuilder::new("p").trigger(Trigger::Manual).build();
        let translator = engine(
            "<p id=\"a\">Message driven</p><p id=\"b\">Left alone</p>",
            rule,
            MockTranslator::prefixed("译:"),
        );
        let a = HtmlTestHelper::first(translator.page(), "#a");
        let b = HtmlTestHelper::first(translator.page(), "#b");
        let original = outer_html(&a);

        let outcome = dispatch(&translator, ControlMessage::Enable).unwrap();
        assert!(matches!(outcome, MessageOutcome::Done));
        assert!(translator.is_registered());

        let message =
            ControlMessage::from_json(r##"{"type":"translate_element","selector":"#a"}"##)
                .unwrap();
        let tasks = dispatch(&translator, message)
            .unwrap()
            .into_tasks()
            .expect("render started");
        tasks.settled().await;

        assert_eq!(
            HtmlTestHelper::host_html(&a).as_deref(),
            Some("译:Message driven")
        );
        assert!(HtmlTestHelper::hosts(&b).is_empty());

        let outcome = dispatch(&translator, ControlMessage::ToggleStyle).unwrap();
        assert!(matches!(outcome, MessageOutcome::StyleChanged(TextStyle::Dashline)));

        dispatch(&translator, ControlMessage::Disable).unwrap();
        assert!(!translator.is_registered());
        assert_eq!(outer_html(&a), original);
    })
    .await;
}

/// 选择器无匹配或无效时的处理
#[tokio::test]
async fn test_translate_element_edge_cases() {
    local(async {
        let translator = engine(
            "<p>Nothing to see</p>",
            RuleBuilder::new("p").build(),
            MockTranslator::identity(),
        );

        let outcome = dispatch(
            &translator,
            ControlMessage::TranslateElement {
                selector: "#missing".to_string(),
            },
        )
        .unwrap();
        assert!(matches!(outcome, MessageOutcome::NoMatch));

        let result = dispatch(
            &translator,
            ControlMessage::TranslateElement {
                selector: "p:first-child".to_string(),
            },
        );
        assert!(result.is_err());
    })
    .await;
}

/// 全部翻译消息返回可等待的任务集合
#[tokio::test]
async fn test_translate_all_message() {
    local(async {
        let backend = MockTranslator::identity();
        let translator = engine(
            &HtmlTestHelper::create_simple_english_page(),
            RuleBuilder::new("h1; p").trigger(Trigger::OnVisible).build(),
            backend.clone(),
        );
        dispatch(&translator, ControlMessage::Enable).unwrap();

        let tasks = dispatch(&translator, ControlMessage::TranslateAll)
            .unwrap()
            .into_tasks()
            .expect("tasks");
        assert_eq!(tasks.len(), 2);
        tasks.settled().await;
        translator.idle().await;

        assert_eq!(backend.call_count(), 2);
    })
    .await;
}

/// 切换输出模式的消息同时产生偏好补丁并更新规则
#[tokio::test]
async fn test_display_mode_message_persists() {
    local(async {
        let dir = scratch_dir("mode");
        let store = SettingsStore::new(dir.join("settings.toml"));
        let translator = engine(
            "<p>Mode switch</p>",
            RuleBuilder::new("p").build(),
            MockTranslator::identity(),
        );

        let message = ControlMessage::SetDisplayMode {
            mode: DisplayMode::Replace,
        };
        if let Some(patch) = message.settings_patch() {
            store.save(patch).unwrap();
        }
        dispatch(&translator, message).unwrap();

        assert_eq!(translator.rule().display_mode, DisplayMode::Replace);
        assert!(!translator.rescan_pending());

        let stored = store.load();
        assert_eq!(stored.display_mode, DisplayMode::Replace);
        assert!(stored.enabled);

        let mut rule = RuleBuilder::new("p").build();
        stored.apply_to(&mut rule);
        assert_eq!(rule.display_mode, DisplayMode::Replace);
    })
    .await;
}

/// 划词翻译只返回最新请求，跳过不合格选区
#[tokio::test]
async fn test_selection_translation() {
    let backend = MockTranslator::prefixed("译:");
    let selection = SelectionTranslator::new(backend.clone());

    match selection.translate_selection("  Selected words ", None).await {
        SelectionOutcome::Translated { text, .. } => assert_eq!(text, "译:Selected words"),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let page = Page::parse("<textarea id=\"t\">Typing here</textarea>");
    let anchor = HtmlTestHelper::first(&page, "#t");
    assert!(matches!(
        selection.translate_selection("Typing here", Some(&anchor)).await,
        SelectionOutcome::Skipped(SkipReason::Editable)
    ));
    assert!(matches!(
        selection.translate_selection("翻译", None).await,
        SelectionOutcome::Skipped(SkipReason::NotEnglish)
    ));

    let rejecting = SelectionTranslator::new(MockTranslator::rejecting());
    assert!(matches!(
        rejecting.translate_selection("Broken backend", None).await,
        SelectionOutcome::Failed(_)
    ));

    assert_eq!(backend.call_count(), 1);
}

/// 配置文件中的规则和参数被完整加载
#[tokio::test]
async fn test_engine_from_config_file() {
    local(async {
        let dir = scratch_dir("config");
        let path = dir.join("dom-translator.toml");
        std::fs::write(
            &path,
            r#"
[rule]
selector = "article p"
keep_selector = "code"
terms = "Rust,锈; Cargo,货物"
display_mode = "replace"
trigger = "eager"
min_len = 1

[setting]
host_tag = "my-trans"
reflow_debounce_ms = 50

[backend]
api_url = "http://127.0.0.1:1188/translate"
target_lang = "ja"
"#,
        )
        .unwrap();

        let manager = ConfigManager::from_file(path.to_str().unwrap()).expect("config loads");
        let config = manager.get_config().clone();
        assert_eq!(config.rule.trigger, Trigger::Eager);
        assert_eq!(config.rule.terms.len(), 2);
        assert_eq!(config.setting.host_tag, "my-trans");
        assert_eq!(config.backend.target_lang, "ja");

        let backend = MockTranslator::identity();
        let page = Page::parse("<article><p id=\"p\">Rust uses <code>cargo</code></p></article><p>Outside</p>");
        let translator =
            DomTranslator::from_config(page, &config, backend.clone()).expect("engine builds");
        translator.register();
        translator.idle().await;

        assert_eq!(backend.calls(), vec!["[1] uses [0]".to_string()]);
        let node = HtmlTestHelper::first(translator.page(), "#p");
        assert_eq!(
            outer_html(&node),
            "<p id=\"p\"><i class=\"kt-term\">锈</i> uses <code>cargo</code></p>"
        );
    })
    .await;
}

/// 无效配置在加载时被拒绝
#[test]
fn test_invalid_config_is_rejected() {
    let dir = scratch_dir("invalid");
    let path = dir.join("bad.toml");
    std::fs::write(&path, "[setting]\nhost_tag = \"span\"\n").unwrap();
    assert!(ConfigManager::from_file(path.to_str().unwrap()).is_err());

    let path = dir.join("bad-selector.json");
    std::fs::write(&path, r#"{"rule": {"selector": "p:hover"}}"#).unwrap();
    assert!(ConfigManager::from_file(path.to_str().unwrap()).is_err());
}
