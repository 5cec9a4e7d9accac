//! Mock 生成客户端（用于测试与无 API Key 的本地运行）
//!
//! 支持两种模式：脚本化（按顺序弹出预置输出）与启发式（按指令内容返回
//! 对应阶段的最小合法输出），便于离线跑通整条流水线。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::session::Turn;

/// Mock 客户端：脚本队列非空时按序弹出，否则按指令启发式返回
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Result<Value, String>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组按序返回的结构化输出
    pub fn with_responses(responses: Vec<Value>) -> Self {
        Self {
            scripted: Mutex::new(responses.into_iter().map(Ok).collect()),
        }
    }

    /// 追加一条脚本输出
    pub fn push_response(&self, response: Value) {
        self.scripted.lock().unwrap().push_back(Ok(response));
    }

    /// 追加一条脚本错误（模拟生成失败）
    pub fn push_error(&self, error: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(Err(error.into()));
    }

    /// 无脚本时的启发式输出：按指令关键词匹配阶段，返回最小合法 JSON
    fn canned_output(instructions: &str, context: &[Turn]) -> Value {
        let last_user = context
            .iter()
            .rev()
            .find(|t| matches!(t.role, crate::session::Role::User))
            .map(|t| t.content.as_str())
            .unwrap_or("(no input)");

        if instructions.contains("profiling expert") {
            json!({
                "justification": format!("Mock profile for: {}", last_user),
                "safetyIssue": false,
                "profileChangeRecommendations": []
            })
        } else if instructions.contains("analyze conversations") {
            json!({
                "outcome": "OUTCOMEAMBIGUOUS",
                "sentiment": "SENTIMENTNEUTRAL",
                "reasoning": format!("Mock analysis for: {}", last_user)
            })
        } else {
            json!({
                "response": format!("Mock: no movies were found that matched '{}'", last_user)
            })
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        instructions: &str,
        context: &[Turn],
        _output_schema: &Value,
    ) -> Result<Value, String> {
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(Self::canned_output(instructions, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let mock = MockLlmClient::with_responses(vec![json!({"a": 1}), json!({"a": 2})]);
        let first = mock.generate("", &[], &json!({})).await.unwrap();
        let second = mock.generate("", &[], &json!({})).await.unwrap();
        assert_eq!(first["a"], 1);
        assert_eq!(second["a"], 2);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let mock = MockLlmClient::new();
        mock.push_error("backend down");
        assert!(mock.generate("", &[], &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_canned_output_by_instructions() {
        let mock = MockLlmClient::new();
        let out = mock
            .generate("You are a user's movie profiling expert", &[], &json!({}))
            .await
            .unwrap();
        assert_eq!(out["safetyIssue"], false);
    }
}
