//! 阶段级错误类型
//!
//! 流水线中任一阶段失败都会携带此处的某个变体向上传播，最终由 TaskExecutor
//! 映射为任务的 Failed 终态；净化服务降级（fail-open）不在此列，只记日志。

use thiserror::Error;

/// 阶段运行过程中可能出现的错误（生成、解析、工具、会话、状态键冲突等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 阶段输出未通过自身 Schema 校验，对该阶段致命
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// 工具参数未通过注册 Schema 校验（处理器未被调用）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 外部调用超出配置时限（生成能力或工具），对该阶段致命，核心不自动重试
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// 取消等不受支持的操作：显式拒绝，不改变任何状态
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 阶段试图写入已被更早阶段占用的输出键
    #[error("Stage output key already written: {0}")]
    DuplicateOutputKey(String),

    #[error("Session error: {0}")]
    SessionError(String),
}
