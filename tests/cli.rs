//! 命令行集成测试

use std::path::PathBuf;

use assert_cmd::Command;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "dom-translator-cli-{}-{}",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("dom-translator").expect("binary is built");
    cmd.env_remove("DOM_TRANSLATOR_API_URL")
        .env_remove("DOM_TRANSLATOR_HOST_TAG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_options() {
    let output = cli().arg("--help").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"));
    assert!(stdout.contains("--selector"));
    assert!(stdout.contains("--generate-config"));
}

#[test]
fn test_list_env_prints_variables() {
    let output = cli().arg("--list-env").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DOM_TRANSLATOR_API_URL"));
    assert!(stdout.contains("DOM_TRANSLATOR_HOST_TAG"));
}

#[test]
fn test_unknown_display_mode_is_rejected() {
    let output = cli()
        .args(["--mode", "sideways", "-"])
        .write_stdin("<p>Hello</p>")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!String::from_utf8_lossy(&output.stderr).is_empty());
}

#[test]
fn test_generate_config_writes_file() {
    let dir = scratch_dir("generate");
    let path = dir.join("dom-translator.toml");

    let output = cli()
        .arg("--generate-config")
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("[rule]"));
    assert!(content.contains("[backend]"));
}

/// 没有候选节点时不会请求翻译服务，文档原样输出
#[test]
fn test_document_without_candidates_passes_through() {
    let dir = scratch_dir("passthrough");
    let output_path = dir.join("out.html");

    let output = cli()
        .current_dir(&dir)
        .args(["--selector", "article p", "--api-url", "http://127.0.0.1:9/translate"])
        .arg("-o")
        .arg(&output_path)
        .write_stdin("<html><head></head><body><p>Not inside an article</p></body></html>")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let html = std::fs::read_to_string(&output_path).unwrap();
    assert!(html.contains("<p>Not inside an article</p>"));
    assert!(!html.contains("</x-kt-trans>"));
}

#[test]
fn test_invalid_selector_fails() {
    let dir = scratch_dir("invalid");
    let output = cli()
        .current_dir(&dir)
        .args(["--selector", "p:hover"])
        .write_stdin("<p>Hello</p>")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}
