//! 任务执行器
//!
//! 拥有每个请求的生命周期：接收即记录 Submitted（先于任何会话解析），
//! 解析/创建会话后进入 Working 并运行流水线，按时间顺序向单一订阅者推送
//! 状态事件，终态事件保证送达（至少一次）。取消无条件不受支持。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use crate::core::AgentError;
use crate::guardrail::SanitizationGate;
use crate::llm::LlmClient;
use crate::pipeline::Pipeline;
use crate::session::{ConversationState, SessionKey, SessionStore, Turn};
use crate::stages::StageContext;
use crate::task::{StatusEvent, Task, TaskId, TaskState};
use crate::tools::{ToolContext, ToolDispatcher};

/// 执行器配置（来自 AppConfig 的相关字段）
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub generate_timeout_secs: u64,
    pub max_tool_rounds: usize,
    pub max_context_turns: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            generate_timeout_secs: 60,
            max_tool_rounds: 4,
            max_context_turns: 20,
        }
    }
}

/// 任务句柄：任务 ID + 该任务的状态事件订阅端
pub struct TaskHandle {
    pub task_id: TaskId,
    pub events: mpsc::UnboundedReceiver<StatusEvent>,
}

/// 任务执行器：每个任务一个逻辑工作单元，任务之间相互独立
#[derive(Clone)]
pub struct TaskExecutor {
    pipeline: Arc<Pipeline>,
    sessions: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmClient>,
    gate: Arc<SanitizationGate>,
    dispatcher: Arc<ToolDispatcher>,
    config: ExecutorConfig,
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl TaskExecutor {
    pub fn new(
        pipeline: Arc<Pipeline>,
        sessions: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmClient>,
        gate: Arc<SanitizationGate>,
        dispatcher: Arc<ToolDispatcher>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            pipeline,
            sessions,
            llm,
            gate,
            dispatcher,
            config,
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 提交任务：接收瞬间记录并推送 Submitted，再在后台解析会话与执行流水线。
    /// 即使会话解析随后失败，调用方也总能观测到提交。
    pub async fn submit(&self, caller: SessionKey, user_text: impl Into<String>) -> TaskHandle {
        let task = Task::new(caller.session.clone());
        let task_id = task.id.clone();
        let submitted = task.status_history[0].clone();

        let (tx, rx) = mpsc::unbounded_channel();
        self.tasks.write().await.insert(task_id.clone(), task);
        let _ = tx.send(submitted);
        tracing::info!(task_id = %task_id, caller = %caller, "task submitted");

        let executor = self.clone();
        let id = task_id.clone();
        let user_text = user_text.into();
        tokio::spawn(async move {
            executor.execute(id, caller, user_text, tx).await;
        });

        TaskHandle { task_id, events: rx }
    }

    /// 取消：无条件不受支持，显式拒绝且不触碰任何任务状态
    pub async fn cancel(&self, _task_id: &str) -> Result<(), AgentError> {
        Err(AgentError::UnsupportedOperation(
            "task cancellation is not supported".to_string(),
        ))
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// 单个任务的完整执行：会话解析 -> Working -> 流水线 -> 终态
    async fn execute(
        &self,
        task_id: TaskId,
        caller: SessionKey,
        user_text: String,
        tx: mpsc::UnboundedSender<StatusEvent>,
    ) {
        // 会话解析（任务仍处于 Submitted，失败则直接 Failed）
        let session = match self.sessions.resolve(&caller).await {
            Ok(session) => session,
            Err(e) => {
                self.fail(&task_id, format!("Session resolution failed: {}", e), &tx)
                    .await;
                return;
            }
        };

        let current = Turn::user(user_text);
        if let Err(e) = self.sessions.append_turn(&caller, current.clone()).await {
            self.fail(&task_id, format!("Session append failed: {}", e), &tx)
                .await;
            return;
        }

        // 播种对话状态：会话历史尾部 + 当前回合
        let history: Vec<Turn> = session
            .turns
            .iter()
            .rev()
            .take(self.config.max_context_turns)
            .rev()
            .cloned()
            .collect();
        let mut state = ConversationState::new(history, current);

        // 紧接流水线启动之前进入 Working
        if !self
            .transition(&task_id, TaskState::Working, Some("Working...".to_string()), &tx)
            .await
        {
            return;
        }

        let cx = StageContext {
            llm: self.llm.clone(),
            gate: self.gate.clone(),
            dispatcher: self.dispatcher.clone(),
            tool_ctx: ToolContext::new(caller.clone()),
            generate_timeout: Duration::from_secs(self.config.generate_timeout_secs),
            max_tool_rounds: self.config.max_tool_rounds,
        };

        match self.pipeline.run(&mut state, &cx).await {
            Ok(()) => match state.final_text() {
                Some(artifact) => {
                    // 产物回写会话日志，后续任务可见
                    let _ = self
                        .sessions
                        .append_turn(&caller, Turn::assistant(artifact.clone()))
                        .await;
                    self.complete(&task_id, artifact, &tx).await;
                }
                // 流水线落空：没有终态输出本身就是失败，不能当作静默成功
                None => {
                    self.fail(
                        &task_id,
                        "Pipeline finished without producing a terminal output".to_string(),
                        &tx,
                    )
                    .await;
                }
            },
            Err(e) => {
                self.fail(&task_id, format!("Failed to generate a response: {}", e), &tx)
                    .await;
            }
        }
    }

    /// 执行迁移并推送事件；迁移被状态机拒绝时记日志并返回 false
    async fn transition(
        &self,
        task_id: &str,
        next: TaskState,
        message: Option<String>,
        tx: &mpsc::UnboundedSender<StatusEvent>,
    ) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(task_id) else {
            return false;
        };
        match task.transition(next, message) {
            Ok(event) => {
                let _ = tx.send(event);
                true
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "rejected task transition");
                false
            }
        }
    }

    async fn complete(&self, task_id: &str, artifact: String, tx: &mpsc::UnboundedSender<StatusEvent>) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(task_id) {
            match task.complete(artifact) {
                Ok(event) => {
                    tracing::info!(task_id = %task_id, "task completed");
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!(task_id = %task_id, error = %e, "rejected completion"),
            }
        }
    }

    async fn fail(&self, task_id: &str, reason: String, tx: &mpsc::UnboundedSender<StatusEvent>) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(task_id) {
            match task.fail(reason) {
                Ok(event) => {
                    tracing::warn!(task_id = %task_id, reason = ?event.message, "task failed");
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!(task_id = %task_id, error = %e, "rejected failure"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::NoopPolicyClient;
    use crate::llm::MockLlmClient;
    use crate::session::{InMemorySessionStore, Session};
    use crate::stages::StageAgent;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use serde_json::json;

    fn key() -> SessionKey {
        SessionKey::new("movie-guru", "user-1", "session-1")
    }

    fn executor_with(llm: Arc<dyn LlmClient>, sessions: Arc<dyn SessionStore>) -> TaskExecutor {
        let stage = StageAgent::new(
            "only_stage",
            "onlyOutput",
            "instructions",
            json!({}),
            Box::new(|_| Ok(())),
        );
        TaskExecutor::new(
            Arc::new(Pipeline::new("test", vec![stage])),
            sessions,
            llm,
            Arc::new(SanitizationGate::new(
                Arc::new(NoopPolicyClient),
                "inbound blocked",
                "outbound blocked",
            )),
            Arc::new(ToolDispatcher::new(ToolRegistry::new(), 5)),
            ExecutorConfig::default(),
        )
    }

    async fn drain(handle: &mut TaskHandle) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            let terminal = event.state.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_happy_path_event_order_and_artifact() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![json!({"answer": 1})]));
        let executor = executor_with(llm, Arc::new(InMemorySessionStore::new()));

        let mut handle = executor.submit(key(), "hello").await;
        let events = drain(&mut handle).await;

        let states: Vec<TaskState> = events.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![TaskState::Submitted, TaskState::Working, TaskState::Completed]
        );

        let task = executor.get(&handle.task_id).await.unwrap();
        assert_eq!(task.artifact.as_deref(), Some(r#"{"answer":1}"#));
    }

    #[tokio::test]
    async fn test_pipeline_error_fails_task() {
        let llm = MockLlmClient::new();
        llm.push_error("backend down");
        let executor = executor_with(Arc::new(llm), Arc::new(InMemorySessionStore::new()));

        let mut handle = executor.submit(key(), "hello").await;
        let events = drain(&mut handle).await;

        assert_eq!(events.last().unwrap().state, TaskState::Failed);
        let task = executor.get(&handle.task_id).await.unwrap();
        assert!(task.failure_reason.as_deref().unwrap().contains("only_stage"));
    }

    /// 只会解析失败的会话存储
    struct BrokenSessionStore;

    #[async_trait]
    impl SessionStore for BrokenSessionStore {
        async fn get_session(&self, _key: &SessionKey) -> Result<Option<Session>, String> {
            Err("store unreachable".to_string())
        }

        async fn create_session(&self, _key: &SessionKey) -> Result<Session, String> {
            Err("store unreachable".to_string())
        }

        async fn append_turn(&self, _key: &SessionKey, _turn: Turn) -> Result<(), String> {
            Err("store unreachable".to_string())
        }

        async fn recall_memory(
            &self,
            _key: &SessionKey,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<Turn>, String> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_session_failure_fails_before_working() {
        let llm = Arc::new(MockLlmClient::new());
        let executor = executor_with(llm, Arc::new(BrokenSessionStore));

        let mut handle = executor.submit(key(), "hello").await;
        let events = drain(&mut handle).await;

        // Submitted 总是可观测；Working 被跳过
        let states: Vec<TaskState> = events.iter().map(|e| e.state).collect();
        assert_eq!(states, vec![TaskState::Submitted, TaskState::Failed]);
    }

    #[tokio::test]
    async fn test_cancel_is_unsupported_and_leaves_state() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![json!({"answer": 1})]));
        let executor = executor_with(llm, Arc::new(InMemorySessionStore::new()));

        let mut handle = executor.submit(key(), "hello").await;
        let events = drain(&mut handle).await;
        let before = executor.get(&handle.task_id).await.unwrap();

        let err = executor.cancel(&handle.task_id).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedOperation(_)));

        let after = executor.get(&handle.task_id).await.unwrap();
        assert_eq!(after.state, before.state);
        assert_eq!(after.status_history.len(), before.status_history.len());
        assert_eq!(events.last().unwrap().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_artifact_appended_to_session() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let llm = Arc::new(MockLlmClient::with_responses(vec![json!({"answer": 1})]));
        let executor = executor_with(llm, sessions.clone());

        let mut handle = executor.submit(key(), "hello").await;
        drain(&mut handle).await;

        let session = sessions.get_session(&key()).await.unwrap().unwrap();
        assert_eq!(session.turns.len(), 2);
        assert!(session.turns[1].content.contains("answer"));
    }
}
