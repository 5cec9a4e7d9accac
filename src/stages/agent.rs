//! 阶段执行单元
//!
//! 单个阶段的完整流程：入站净化（命中则短路，不调用生成能力）->
//! 生成（模型可要求工具调用，同轮并发分发并 join）-> 出站净化 ->
//! Schema 校验 -> 写入对话状态（每个阶段恰好拥有一个输出键）。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::guardrail::{Direction, SanitizationGate};
use crate::llm::LlmClient;
use crate::session::{ConversationState, StageOutput, Turn};
use crate::tools::{ToolContext, ToolDispatcher, ToolError};

/// 模型要求的一次工具调用（{"tool": "...", "args": {...}}）
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// 阶段运行依赖：生成能力、净化门、工具分发器与调用方身份
///
/// 每个任务构造一次，身份由请求上下文注入后只读透传。
pub struct StageContext {
    pub llm: Arc<dyn LlmClient>,
    pub gate: Arc<SanitizationGate>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub tool_ctx: ToolContext,
    /// 单次生成调用超时
    pub generate_timeout: Duration,
    /// 单阶段工具调用轮数上限
    pub max_tool_rounds: usize,
}

/// 一个推理阶段：固定指令 + 输出 Schema + 可用工具集
pub struct StageAgent {
    name: String,
    output_key: String,
    instructions: String,
    output_schema: Value,
    /// 输出校验：对放行的原始模型输出做强类型校验
    validate: Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
    allowed_tools: Vec<String>,
}

impl StageAgent {
    pub fn new(
        name: impl Into<String>,
        output_key: impl Into<String>,
        instructions: impl Into<String>,
        output_schema: Value,
        validate: Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
    ) -> Self {
        Self {
            name: name.into(),
            output_key: output_key.into(),
            instructions: instructions.into(),
            output_schema,
            validate,
            allowed_tools: Vec::new(),
        }
    }

    /// 设置该阶段可用的工具名列表
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    /// 运行阶段：净化 -> 生成/工具循环 -> 净化 -> 校验 -> 记录输出
    pub async fn run(
        &self,
        state: &mut ConversationState,
        cx: &StageContext,
    ) -> Result<(), AgentError> {
        let current = state
            .current_turn()
            .ok_or_else(|| AgentError::SessionError("no current user turn".to_string()))?
            .clone();

        // 入站净化：命中则短路，生成能力不会被调用
        let verdict = cx.gate.inspect(&current.content, Direction::Inbound).await;
        if !verdict.passed {
            tracing::info!(stage = %self.name, "inbound turn blocked by policy");
            let text = verdict.replacement().unwrap_or_default().to_string();
            return state.record_output(
                &self.output_key,
                StageOutput::PolicyBlocked {
                    text,
                    reason: verdict.reason,
                },
            );
        }

        let instructions = self.build_instructions(cx);
        let mut context = self.seed_context(state);

        let mut rounds = 0;
        let raw = loop {
            let generated = timeout(
                cx.generate_timeout,
                cx.llm.generate(&instructions, &context, &self.output_schema),
            )
            .await
            .map_err(|_| AgentError::Timeout(format!("generate ({})", self.name)))?
            .map_err(AgentError::LlmError)?;

            let Some(calls) = parse_tool_calls(&generated)? else {
                break generated;
            };

            if rounds >= cx.max_tool_rounds {
                return Err(AgentError::LlmError(format!(
                    "stage '{}' exceeded {} tool rounds",
                    self.name, cx.max_tool_rounds
                )));
            }
            rounds += 1;

            for call in &calls {
                if !self.allowed_tools.iter().any(|t| t == &call.tool) {
                    return Err(AgentError::NotFound(format!(
                        "tool '{}' is not available to stage '{}'",
                        call.tool, self.name
                    )));
                }
            }

            // 同一轮的工具调用之间无顺序约束，并发分发；
            // 全部归位（join）后才能进入下一轮生成
            let results = join_all(calls.iter().map(|call| {
                cx.dispatcher
                    .dispatch(&call.tool, call.args.clone(), &cx.tool_ctx)
            }))
            .await;

            for (call, result) in calls.iter().zip(results) {
                let observation = match result {
                    Ok(value) => value.to_string(),
                    Err(ToolError::InvalidArgument(msg)) => {
                        return Err(AgentError::InvalidArgument(msg));
                    }
                    Err(ToolError::Timeout(tool)) => {
                        return Err(AgentError::Timeout(format!("tool {}", tool)));
                    }
                    Err(ToolError::UnknownTool(tool)) => {
                        return Err(AgentError::NotFound(format!("tool {}", tool)));
                    }
                    // 执行失败作为观察结果交回模型（空结果不是错误）
                    Err(e) => format!("Error: {}", e),
                };
                context.push(Turn::assistant(format!(
                    "Tool call: {} | Result: {}",
                    call.tool, observation
                )));
            }
        };

        // 出站净化：命中则以替换文本记录，原始输出不再向下游转发
        let verdict = cx.gate.inspect(&raw.to_string(), Direction::Outbound).await;
        if !verdict.passed {
            tracing::info!(stage = %self.name, "model response blocked by policy");
            let text = verdict.replacement().unwrap_or_default().to_string();
            return state.record_output(
                &self.output_key,
                StageOutput::PolicyBlocked {
                    text,
                    reason: verdict.reason,
                },
            );
        }

        // Schema 校验只对放行的原始输出执行
        (self.validate)(&raw)
            .map_err(|e| AgentError::SchemaViolation(format!("{}: {}", self.name, e)))?;

        state.record_output(&self.output_key, StageOutput::Structured(raw))
    }

    /// 阶段指令 + 可用工具段落（含调用格式约定）
    fn build_instructions(&self, cx: &StageContext) -> String {
        if self.allowed_tools.is_empty() {
            return self.instructions.clone();
        }
        format!(
            "{}\n\nAvailable tools:\n{}\n\nTo call tools, respond with a single JSON object \
             {{\"tool_calls\": [{{\"tool\": \"name\", \"args\": {{...}}}}]}} instead of the final answer. \
             Tool results will be appended to the conversation.",
            self.instructions,
            cx.dispatcher.schema_json_for(&self.allowed_tools)
        )
    }

    /// 播种生成上下文：历史回合 + 已有阶段输出（按流水线顺序）+ 当前回合
    fn seed_context(&self, state: &ConversationState) -> Vec<Turn> {
        let mut context: Vec<Turn> = state.history().to_vec();
        for (key, output) in state.outputs() {
            context.push(Turn::assistant(format!("[{}] {}", key, output.as_text())));
        }
        if let Some(turn) = state.current_turn() {
            context.push(turn.clone());
        }
        context
    }
}

/// 识别模型输出中的工具调用请求；"tool_calls" 存在但形状非法时报 JsonParseError
fn parse_tool_calls(generated: &Value) -> Result<Option<Vec<ToolCallRequest>>, AgentError> {
    let Some(calls) = generated.get("tool_calls") else {
        return Ok(None);
    };
    let calls: Vec<ToolCallRequest> = serde_json::from_value(calls.clone())
        .map_err(|e| AgentError::JsonParseError(format!("tool_calls: {}", e)))?;
    Ok(Some(calls))
}
