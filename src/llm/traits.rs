//! 生成能力抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：generate 接收阶段指令、
//! 对话上下文与期望的输出 Schema，返回结构化 JSON；对核心而言这是一个黑盒。

use async_trait::async_trait;
use serde_json::Value;

use crate::session::Turn;

/// 生成能力 trait：结构化生成，返回符合（或声称符合）给定 Schema 的 JSON
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 结构化生成：instructions 为阶段固定指令，context 为对话上下文，
    /// output_schema 为期望的输出 JSON Schema（注入提示，由调用方校验）
    async fn generate(
        &self,
        instructions: &str,
        context: &[Turn],
        output_schema: &Value,
    ) -> Result<Value, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 从模型文本输出中提取 JSON 对象（```json ... ``` 代码块或首个 {...} 块）并解析
pub fn extract_json(output: &str) -> Result<Value, String> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        match trimmed.rfind('}') {
            Some(end) if end > start => &trimmed[start..=end],
            _ => trimmed,
        }
    } else {
        return Err(format!("No JSON object in model output: {}", trimmed));
    };

    serde_json::from_str(json_str).map_err(|e| format!("{}: {}", e, json_str))
}
