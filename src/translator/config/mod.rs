//! 翻译引擎配置模块
//!
//! - `rule`: 翻译规则（选择什么、保护什么、如何输出、何时触发）
//! - `setting`: 引擎参数（防抖、可见阈值、跳过标签、宿主标签）
//! - `manager`: 分层加载（.env、配置文件、环境变量覆盖）

pub mod manager;
pub mod rule;
pub mod setting;

pub use manager::{BackendConfig, ConfigManager, TranslatorConfig};
pub use rule::{
    CompiledRule, DisplayMode, HoverKey, Rule, RulePatch, TermDictionary, TermEntry, TextStyle,
    Trigger,
};
pub use setting::Setting;

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 规则默认值
    pub const DEFAULT_SELECTOR: &str =
        "p; li; h1; h2; h3; h4; h5; h6; blockquote; figcaption; dt; dd; th; td";
    pub const DEFAULT_KEEP_SELECTOR: &str =
        "img; svg; video; audio; iframe; picture; canvas; code; kbd; pre; math; input; button; select; textarea; a";
    pub const DEFAULT_MIN_LEN: usize = 2;
    pub const DEFAULT_MAX_LEN: usize = 8000;

    // 引擎默认值
    pub const DEFAULT_REFLOW_DEBOUNCE: Duration = Duration::from_millis(300);
    pub const DEFAULT_VISIBLE_THRESHOLD: f64 = 0.1;
    pub const DEFAULT_HOST_TAG: &str = "x-kt-trans";
    pub const DEFAULT_SKIP_TAGS: &[&str] = &[
        "style", "script", "svg", "img", "video", "audio", "textarea", "input", "button",
        "select", "option", "iframe",
    ];

    // 注入内容的标记
    pub const STYLE_MARKER_ATTR: &str = "data-kt-trans-css";
    pub const DOCUMENT_STYLE_ID: &str = "kt-trans-css";
    pub const HOST_STYLE_ATTR: &str = "data-style";
    pub const TERM_CLASS: &str = "kt-term";

    // 默认API设置
    pub const DEFAULT_API_URL: &str = "http://localhost:1188/translate";
    pub const DEFAULT_SOURCE_LANG: &str = "en";
    pub const DEFAULT_TARGET_LANG: &str = "zh";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    // 划词翻译
    pub const MAX_SELECTION_LEN: usize = 500;

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "dom-translator.toml",
        ".dom-translator.toml",
        "dom-translator.json",
        "~/.config/dom-translator/config.toml",
        "/etc/dom-translator/config.toml",
    ];

    // 用户偏好默认保存位置
    pub const SETTINGS_PATH: &str = "~/.config/dom-translator/settings.toml";
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}
