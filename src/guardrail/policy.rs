//! 策略客户端：外部策略服务的调用抽象
//!
//! HttpPolicyClient 对接 REST 策略服务（按模板分别净化用户输入与模型输出）；
//! NoopPolicyClient 在未配置端点时使用，全部放行。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::guardrail::Direction;

/// 策略客户端 trait：检查文本是否命中策略
///
/// Ok(Some(reason)) 表示命中（需替换），Ok(None) 表示放行，
/// Err 表示服务不可达或内部错误（由守护栏 fail-open 处理）。
#[async_trait]
pub trait PolicyClient: Send + Sync {
    async fn check(&self, text: &str, direction: Direction) -> Result<Option<String>, String>;
}

/// 空实现：未配置策略服务时使用，全部放行
#[derive(Clone, Default)]
pub struct NoopPolicyClient;

#[async_trait]
impl PolicyClient for NoopPolicyClient {
    async fn check(&self, _text: &str, _direction: Direction) -> Result<Option<String>, String> {
        Ok(None)
    }
}

/// 策略服务的响应体
#[derive(Debug, Deserialize)]
struct SanitizeResponse {
    /// MATCH_FOUND 表示命中策略
    #[serde(default)]
    filter_match_state: String,
    #[serde(default)]
    reason: Option<String>,
}

/// REST 策略客户端：按方向选择端点路径，POST 模板与文本
pub struct HttpPolicyClient {
    client: reqwest::Client,
    endpoint: String,
    template: String,
}

impl HttpPolicyClient {
    pub fn new(endpoint: impl Into<String>, template: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            template: template.into(),
        }
    }
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn check(&self, text: &str, direction: Direction) -> Result<Option<String>, String> {
        let path = match direction {
            Direction::Inbound => "sanitizeUserPrompt",
            Direction::Outbound => "sanitizeModelResponse",
        };
        let url = format!("{}/{}:{}", self.endpoint.trim_end_matches('/'), self.template, path);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| format!("Policy request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Policy service HTTP {}", response.status()));
        }

        let body: SanitizeResponse = response
            .json()
            .await
            .map_err(|e| format!("Policy response parse failed: {}", e))?;

        if body.filter_match_state == "MATCH_FOUND" {
            Ok(Some(body.reason.unwrap_or_else(|| "policy match".to_string())))
        } else {
            Ok(None)
        }
    }
}
