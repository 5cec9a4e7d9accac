//! 记忆召回工具：检索调用方会话中的历史回合
//!
//! 会话键整体取自执行上下文，客户端无法指定他人会话。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::session::SessionStore;
use crate::tools::{json_schema_of, Tool, ToolContext};

/// recall_memory 的参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecallMemoryArgs {
    /// 召回查询
    pub query: String,
}

/// 记忆召回工具
pub struct RecallMemoryTool {
    sessions: Arc<dyn SessionStore>,
    top_k: usize,
}

impl RecallMemoryTool {
    pub fn new(sessions: Arc<dyn SessionStore>, top_k: usize) -> Self {
        Self { sessions, top_k }
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }

    fn description(&self) -> &str {
        "Recalls relevant turns from the caller's past conversation. Args: {\"query\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        json_schema_of::<RecallMemoryArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let args: RecallMemoryArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let turns = self
            .sessions
            .recall_memory(&ctx.caller, &args.query, self.top_k)
            .await?;
        serde_json::to_value(turns).map_err(|e| e.to_string())
    }
}
