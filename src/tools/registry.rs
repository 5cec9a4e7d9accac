//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与查找；执行上下文携带调用方身份。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::session::SessionKey;

/// 工具执行上下文
///
/// caller 由请求上下文注入并沿调用链透传：需要「谁的偏好」的工具
/// 只信任这里的身份，客户端无法通过参数冒充他人。
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub caller: SessionKey,
}

impl ToolContext {
    pub fn new(caller: SessionKey) -> Self {
        Self { caller }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 Schema、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 tool call 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（分发前校验依据）
    /// 默认返回空对象，表示无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；args 已通过 Schema 校验，身份从 ctx 读取
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 生成指定工具的 schema JSON（名称、描述、参数），拼入阶段指令
    /// names 为空时包含全部注册工具
    pub fn schema_json_for(&self, names: &[String]) -> String {
        let tools: Vec<serde_json::Value> = self
            .tools
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(name))
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct DummyTool;

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            "dummy"
        }

        fn description(&self) -> &str {
            "A dummy tool"
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
            Ok(json!("ok"))
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(DummyTool);
        assert!(registry.get("dummy").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_schema_json_filters_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(DummyTool);
        let all = registry.schema_json_for(&[]);
        assert!(all.contains("dummy"));
        let none = registry.schema_json_for(&["other".to_string()]);
        assert!(!none.contains("dummy"));
    }
}
