//! 流水线编排器
//!
//! 按给定顺序严格串行执行各阶段：阶段 i+1 总能看到阶段 1..i 的输出；
//! 任一阶段失败即中止余下阶段，携带失败阶段名向上传播，没有部分完成的成功。
//! 编排器自身在多次运行之间无状态，每个任务使用新播种的对话状态。

use thiserror::Error;

use crate::core::AgentError;
use crate::session::ConversationState;
use crate::stages::{StageAgent, StageContext};

/// 流水线错误：失败阶段名 + 原始错误（供诊断保留）
#[derive(Error, Debug)]
#[error("stage '{failed_stage}' failed: {cause}")]
pub struct PipelineError {
    pub failed_stage: String,
    pub cause: AgentError,
}

/// 顺序流水线：有序阶段列表
pub struct Pipeline {
    name: String,
    stages: Vec<StageAgent>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<StageAgent>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 严格按序运行所有阶段；首个失败即中止
    pub async fn run(
        &self,
        state: &mut ConversationState,
        cx: &StageContext,
    ) -> Result<(), PipelineError> {
        for stage in &self.stages {
            tracing::debug!(pipeline = %self.name, stage = %stage.name(), "running stage");
            stage.run(state, cx).await.map_err(|cause| {
                tracing::warn!(pipeline = %self.name, stage = %stage.name(), error = %cause, "stage failed");
                PipelineError {
                    failed_stage: stage.name().to_string(),
                    cause,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::{NoopPolicyClient, SanitizationGate};
    use crate::llm::LlmClient;
    use crate::session::{SessionKey, Turn};
    use crate::stages::StageAgent;
    use crate::tools::{ToolContext, ToolDispatcher, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// 记录每次生成看到的上下文（顺序依赖测试用）
    struct RecordingLlm {
        contexts: Arc<Mutex<Vec<Vec<String>>>>,
        outputs: Mutex<Vec<Result<Value, String>>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn generate(
            &self,
            _instructions: &str,
            context: &[Turn],
            _output_schema: &Value,
        ) -> Result<Value, String> {
            self.contexts
                .lock()
                .unwrap()
                .push(context.iter().map(|t| t.content.clone()).collect());
            self.outputs.lock().unwrap().remove(0)
        }
    }

    fn cx(llm: Arc<dyn LlmClient>) -> StageContext {
        StageContext {
            llm,
            gate: Arc::new(SanitizationGate::new(
                Arc::new(NoopPolicyClient),
                "inbound blocked",
                "outbound blocked",
            )),
            dispatcher: Arc::new(ToolDispatcher::new(ToolRegistry::new(), 5)),
            tool_ctx: ToolContext::new(SessionKey::new("movie-guru", "user-1", "session-1")),
            generate_timeout: Duration::from_secs(5),
            max_tool_rounds: 4,
        }
    }

    fn accept_stage(name: &str, key: &str) -> StageAgent {
        StageAgent::new(name, key, "instructions", json!({}), Box::new(|_| Ok(())))
    }

    #[tokio::test]
    async fn test_sequential_outputs_visible_downstream() {
        let contexts = Arc::new(Mutex::new(Vec::new()));
        let llm = Arc::new(RecordingLlm {
            contexts: contexts.clone(),
            outputs: Mutex::new(vec![Ok(json!({"step": 1})), Ok(json!({"step": 2}))]),
        });
        let pipeline = Pipeline::new(
            "test",
            vec![accept_stage("first", "firstOutput"), accept_stage("second", "secondOutput")],
        );
        let mut state = ConversationState::new(Vec::new(), Turn::user("hello"));

        pipeline.run(&mut state, &cx(llm)).await.unwrap();

        // 第二阶段的上下文包含第一阶段的输出
        let contexts = contexts.lock().unwrap();
        assert_eq!(contexts.len(), 2);
        assert!(contexts[1].iter().any(|c| c.contains("firstOutput")));

        let keys: Vec<&str> = state.outputs().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["firstOutput", "secondOutput"]);
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_remaining() {
        let contexts = Arc::new(Mutex::new(Vec::new()));
        let llm = Arc::new(RecordingLlm {
            contexts: contexts.clone(),
            outputs: Mutex::new(vec![Err("backend down".to_string())]),
        });
        let pipeline = Pipeline::new(
            "test",
            vec![accept_stage("first", "firstOutput"), accept_stage("second", "secondOutput")],
        );
        let mut state = ConversationState::new(Vec::new(), Turn::user("hello"));

        let err = pipeline.run(&mut state, &cx(llm)).await.unwrap_err();
        assert_eq!(err.failed_stage, "first");
        assert!(matches!(err.cause, AgentError::LlmError(_)));
        // 第二阶段从未开始
        assert_eq!(contexts.lock().unwrap().len(), 1);
        assert!(state.output("secondOutput").is_none());
    }
}
