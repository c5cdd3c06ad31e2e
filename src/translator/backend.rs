//! 翻译后端
//!
//! 引擎只依赖 `Translate` 这一个能力：输入原文，输出译文或错误。
//! 引擎运行在单线程上，因此实现产生的 future 不要求 `Send`。

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::translator::config::BackendConfig;
use crate::translator::error::{TranslatorError, TranslatorResult};

/// 翻译能力
#[async_trait(?Send)]
pub trait Translate {
    async fn translate(&self, text: &str) -> TranslatorResult<String>;
}

/// 把宿主提供的异步闭包包装为翻译能力
pub struct FnTranslator<F> {
    func: F,
}

impl<F, Fut> FnTranslator<F>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = TranslatorResult<String>>,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait(?Send)]
impl<F, Fut> Translate for FnTranslator<F>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = TranslatorResult<String>>,
{
    async fn translate(&self, text: &str) -> TranslatorResult<String> {
        (self.func)(text.to_string()).await
    }
}

#[derive(Debug, Serialize)]
struct DeepLxRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeepLxResponse {
    code: i64,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl DeepLxResponse {
    fn into_translation(self) -> TranslatorResult<String> {
        if self.code != 200 {
            return Err(TranslatorError::Translation(format!(
                "翻译服务返回错误码 {}: {}",
                self.code,
                self.message.unwrap_or_default()
            )));
        }
        match self.data {
            Some(data) if !data.trim().is_empty() => Ok(data),
            _ => Err(TranslatorError::EmptyTranslation),
        }
    }
}

/// DeepLX 兼容的 HTTP 翻译服务
pub struct HttpTranslator {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpTranslator {
    pub fn new(config: BackendConfig) -> TranslatorResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[async_trait(?Send)]
impl Translate for HttpTranslator {
    async fn translate(&self, text: &str) -> TranslatorResult<String> {
        let source_lang = self.config.source_lang.to_uppercase();
        let target_lang = self.config.target_lang.to_uppercase();
        let request = DeepLxRequest {
            text,
            source_lang: &source_lang,
            target_lang: &target_lang,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslatorError::Translation(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let body: DeepLxResponse = response.json().await?;
        tracing::debug!("翻译服务响应码 {}", body.code);
        body.into_translation()
    }
}
