//! 命令行入口：翻译一个 HTML 文件并输出结果

use std::fs;
use std::io::{self, Read, Write};
use std::process;
use std::str::FromStr;

use clap::Parser;

use dom_translator::dom::Page;
use dom_translator::env::{self, EnvVar};
use dom_translator::translator::{
    ConfigManager, DisplayMode, DomTranslator, HttpTranslator, RulePatch, TermDictionary,
    TextStyle, TranslatorConfig, TranslatorResult, Trigger,
};

#[derive(Parser, Debug)]
#[command(
    name = "dom-translator",
    version,
    about = "Translate the text of an HTML document in place, keeping markup intact"
)]
struct Cli {
    /// Input HTML file, reads stdin when omitted or "-"
    input: Option<String>,

    /// Write the translated document to this file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Candidate selector, alternatives separated by ';'
    #[arg(short, long)]
    selector: Option<String>,

    /// Protected content selector
    #[arg(short, long)]
    keep: Option<String>,

    /// Term dictionary entries "source,replacement" separated by ';'
    #[arg(short, long)]
    terms: Option<String>,

    /// Output mode: overlay or replace
    #[arg(short, long, value_parser = DisplayMode::from_str)]
    mode: Option<DisplayMode>,

    /// Translation style: fuzzy or dashline
    #[arg(long, value_parser = TextStyle::from_str)]
    style: Option<TextStyle>,

    /// Minimum text length sent to the backend
    #[arg(long)]
    min_len: Option<usize>,

    /// Maximum text length sent to the backend
    #[arg(long)]
    max_len: Option<usize>,

    /// Also translate the document title
    #[arg(long)]
    title: bool,

    /// Translation API endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Target language code
    #[arg(long)]
    target_lang: Option<String>,

    /// Input charset
    #[arg(long, default_value = "utf-8")]
    charset: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<String>,

    /// List supported environment variables and exit
    #[arg(long)]
    list_env: bool,
}

impl Cli {
    fn rule_patch(&self) -> RulePatch {
        RulePatch {
            selector: self.selector.clone(),
            keep_selector: self.keep.clone(),
            terms: self.terms.as_deref().map(TermDictionary::parse),
            display_mode: self.mode,
            // 命令行没有可见区域或指针，只在显式请求时渲染
            trigger: Some(Trigger::Manual),
            min_len: self.min_len,
            max_len: self.max_len,
            text_style: self.style,
            translate_title: self.title.then_some(true),
            ..RulePatch::default()
        }
    }

    fn load_config(&self) -> TranslatorResult<TranslatorConfig> {
        let manager = match &self.config {
            Some(path) => ConfigManager::from_file(path)?,
            None => ConfigManager::new()?,
        };
        let mut config = manager.into_config();

        config.rule.merge(self.rule_patch());
        if let Some(api_url) = &self.api_url {
            config.backend.api_url = api_url.clone();
        }
        if let Some(target_lang) = &self.target_lang {
            config.backend.target_lang = target_lang.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn read_input(&self) -> io::Result<Vec<u8>> {
        match self.input.as_deref() {
            None | Some("-") => {
                let mut data = Vec::new();
                io::stdin().read_to_end(&mut data)?;
                Ok(data)
            }
            Some(path) => fs::read(path),
        }
    }

    fn write_output(&self, html: &str) -> io::Result<()> {
        match &self.output {
            Some(path) => fs::write(path, html),
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(html.as_bytes())?;
                stdout.flush()
            }
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = cli
        .log_level
        .clone()
        .or_else(|| env::core::LogLevel::get().ok())
        .and_then(|level| tracing::Level::from_str(&level).ok())
        .unwrap_or(tracing::Level::INFO);
    let no_color = env::core::NoColor::get_or_default(false);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(!no_color)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.load_config()?;
    let data = cli.read_input()?;
    let page = Page::from_bytes(&data, &cli.charset);

    let backend = HttpTranslator::new(config.backend.clone())?;
    let translator = DomTranslator::from_config(page, &config, backend)?;

    translator.register();
    translator.translate_all().settled().await;
    translator.idle().await;

    let stats = translator.stats();
    tracing::info!(
        "完成：{} 个节点已翻译，{} 个失败，{} 个跳过",
        stats.renders_applied,
        stats.renders_failed,
        stats.renders_skipped
    );

    cli.write_output(&translator.page().to_html())?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.list_env {
        for (name, description) in env::describe_all() {
            println!("{:<40} {}", name, description);
        }
        return;
    }

    init_tracing(&cli);

    if let Some(path) = &cli.generate_config {
        match ConfigManager::generate_example_config(path) {
            Ok(()) => {
                println!("示例配置已写入 {}", path);
                return;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                process::exit(1);
            }
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: 无法创建运行时: {}", err);
            process::exit(1);
        }
    };

    let local = tokio::task::LocalSet::new();
    if let Err(err) = local.block_on(&runtime, run(&cli)) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
