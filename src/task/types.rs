//! 任务与状态机
//!
//! 状态流：Submitted -> Working -> {Completed, Failed}；终态吸收，不允许回退。
//! 状态只能经 transition 变更，每次变更产生一条按时间有序的状态事件。
//! 会话解析失败发生在 Working 之前，因此 Submitted -> Failed 也是合法迁移
//! （观测序列仍是规定序列的子序列）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 任务 ID
pub type TaskId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// 已接收（在任何会话解析之前即进入，保证提交总是可观测）
    Submitted,
    /// 流水线执行中
    Working,
    /// 已完成（附带产物）
    Completed,
    /// 已失败（附带原因）
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// 状态事件：任务状态流中的一条记录
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub task_id: TaskId,
    pub state: TaskState,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 一个任务：生命周期包装器，状态只经 transition 变更
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    /// 关联的会话上下文 ID
    pub context_id: String,
    pub state: TaskState,
    /// 按时间有序的状态历史
    pub status_history: Vec<StatusEvent>,
    /// 完成时的产物（最后一个阶段的文本载荷）
    pub artifact: Option<String>,
    /// 失败原因（人类可读）
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// 创建任务：接收瞬间即进入 Submitted 并记录首条状态事件
    pub fn new(context_id: impl Into<String>) -> Self {
        let id = format!("task_{}", uuid::Uuid::new_v4());
        let submitted = StatusEvent {
            task_id: id.clone(),
            state: TaskState::Submitted,
            message: None,
            timestamp: Utc::now(),
        };
        Self {
            id,
            context_id: context_id.into(),
            state: TaskState::Submitted,
            status_history: vec![submitted],
            artifact: None,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    /// 状态迁移：校验合法性，更新状态并追加状态事件，返回该事件
    pub fn transition(
        &mut self,
        next: TaskState,
        message: Option<String>,
    ) -> Result<StatusEvent, AgentError> {
        let allowed = matches!(
            (self.state, next),
            (TaskState::Submitted, TaskState::Working)
                | (TaskState::Submitted, TaskState::Failed)
                | (TaskState::Working, TaskState::Completed)
                | (TaskState::Working, TaskState::Failed)
        );
        if !allowed {
            return Err(AgentError::UnsupportedOperation(format!(
                "task {} cannot transition {:?} -> {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        let event = StatusEvent {
            task_id: self.id.clone(),
            state: next,
            message,
            timestamp: Utc::now(),
        };
        self.status_history.push(event.clone());
        Ok(event)
    }

    /// 完成任务：附加产物并迁移到 Completed
    pub fn complete(&mut self, artifact: String) -> Result<StatusEvent, AgentError> {
        let event = self.transition(TaskState::Completed, Some(artifact.clone()))?;
        self.artifact = Some(artifact);
        Ok(event)
    }

    /// 失败任务：记录原因并迁移到 Failed
    pub fn fail(&mut self, reason: String) -> Result<StatusEvent, AgentError> {
        let event = self.transition(TaskState::Failed, Some(reason.clone()))?;
        self.failure_reason = Some(reason);
        Ok(event)
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
