//! 工具分发器
//!
//! 持有 ToolRegistry 与全局超时：dispatch 先按注册 Schema 校验参数
//! （未通过时处理器不被调用），再在超时内执行；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

use crate::tools::{validate_args, ToolContext, ToolRegistry};

/// 工具调用错误
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 参数未通过注册 Schema 校验，处理器未被调用
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// 工具分发器：Schema 校验 + 超时 + 审计日志
pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 按名分发：校验参数 -> 超时内执行 -> 映射错误；全程输出审计日志
    pub async fn dispatch(
        &self,
        tool_name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        if let Err(e) = validate_args(&tool.parameters_schema(), &args) {
            self.audit(tool_name, ctx, false, "invalid_argument", 0, &args);
            return Err(ToolError::InvalidArgument(format!("{}: {}", tool_name, e)));
        }

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(args.clone(), ctx)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        self.audit(tool_name, ctx, ok, outcome, duration_ms, &args);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ToolError::ExecutionFailed(e)),
            Err(_) => Err(ToolError::Timeout(tool_name.to_string())),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 生成指定工具的 schema JSON，拼入阶段指令
    pub fn schema_json_for(&self, names: &[String]) -> String {
        self.registry.schema_json_for(names)
    }

    fn audit(
        &self,
        tool_name: &str,
        ctx: &ToolContext,
        ok: bool,
        outcome: &str,
        duration_ms: u64,
        args: &Value,
    ) {
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "caller": ctx.caller.to_string(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;
    use crate::tools::{json_schema_of, Tool};
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct EchoArgs {
        text: String,
    }

    /// 记录执行次数的工具，用于验证校验失败时处理器未被调用
    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "Counts executions"
        }

        fn parameters_schema(&self) -> Value {
            json_schema_of::<EchoArgs>()
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args["text"].clone())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps forever"
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, String> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(json!(null))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SessionKey::new("movie-guru", "user-1", "session-1"))
    }

    #[tokio::test]
    async fn test_dispatch_ok() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool { calls: calls.clone() });
        let dispatcher = ToolDispatcher::new(registry, 5);

        let result = dispatcher
            .dispatch("counting", json!({"text": "hi"}), &ctx())
            .await
            .unwrap();
        assert_eq!(result, json!("hi"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_argument_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool { calls: calls.clone() });
        let dispatcher = ToolDispatcher::new(registry, 5);

        let err = dispatcher
            .dispatch("counting", json!({"text": 42}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::new(), 5);
        let err = dispatcher.dispatch("missing", json!({}), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let dispatcher = ToolDispatcher::new(registry, 1);

        let err = dispatcher.dispatch("slow", json!({}), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }
}
