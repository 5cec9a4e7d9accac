//! 任务级对话状态
//!
//! 任务开始时从会话日志播种，任务结束即丢弃，核心从不直接持久化。
//! 持有当前用户回合与「阶段名 -> 结构化输出」映射，插入顺序即流水线顺序；
//! 每个阶段恰好拥有一个输出键，写入后对本任务余下部分不可变。

use serde_json::Value;

use crate::core::AgentError;
use crate::session::Turn;

/// 单个阶段的输出载荷
#[derive(Clone, Debug)]
pub enum StageOutput {
    /// 通过 Schema 校验的结构化输出
    Structured(Value),
    /// 守护栏命中后的替换文本（跳过 Schema 校验，原文不再向下游转发）
    PolicyBlocked {
        text: String,
        reason: Option<String>,
    },
}

impl StageOutput {
    /// 输出的文本形态：结构化输出序列化为 JSON 字符串，替换文本原样返回
    pub fn as_text(&self) -> String {
        match self {
            StageOutput::Structured(value) => value.to_string(),
            StageOutput::PolicyBlocked { text, .. } => text.clone(),
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            StageOutput::Structured(value) => Some(value),
            StageOutput::PolicyBlocked { .. } => None,
        }
    }

    pub fn is_policy_blocked(&self) -> bool {
        matches!(self, StageOutput::PolicyBlocked { .. })
    }
}

/// 任务级对话状态：历史回合 + 当前回合 + 有序阶段输出
#[derive(Clone, Debug, Default)]
pub struct ConversationState {
    /// 从会话播种的历史回合（不含当前回合）
    history: Vec<Turn>,
    /// 触发本任务的用户回合
    current_turn: Option<Turn>,
    /// 阶段输出，插入顺序即流水线顺序
    outputs: Vec<(String, StageOutput)>,
}

impl ConversationState {
    pub fn new(history: Vec<Turn>, current_turn: Turn) -> Self {
        Self {
            history,
            current_turn: Some(current_turn),
            outputs: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// 最近的用户回合
    pub fn current_turn(&self) -> Option<&Turn> {
        self.current_turn.as_ref()
    }

    /// 记录阶段输出；键已被占用时报 DuplicateOutputKey（阶段键隔离不变量）
    pub fn record_output(&mut self, key: &str, output: StageOutput) -> Result<(), AgentError> {
        if self.outputs.iter().any(|(k, _)| k == key) {
            return Err(AgentError::DuplicateOutputKey(key.to_string()));
        }
        self.outputs.push((key.to_string(), output));
        Ok(())
    }

    pub fn output(&self, key: &str) -> Option<&StageOutput> {
        self.outputs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// 按流水线顺序遍历阶段输出
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &StageOutput)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 最后一个阶段的输出（任务产物来源）
    pub fn last_output(&self) -> Option<(&str, &StageOutput)> {
        self.outputs.last().map(|(k, v)| (k.as_str(), v))
    }

    /// 最后一个阶段输出的文本载荷
    pub fn final_text(&self) -> Option<String> {
        self.last_output().map(|(_, out)| out.as_text())
    }
}
