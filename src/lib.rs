//! Reel - Rust 对话式电影推荐智能体
//!
//! 模块划分：
//! - **agent**: 无头组件装配（LLM / 守护栏 / 工具 / 流水线 / 执行器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与公共类型
//! - **guardrail**: 输入/输出净化守护栏（策略服务失败时 fail-open）
//! - **llm**: 结构化生成能力抽象与实现（OpenAI 兼容 / Mock）
//! - **pipeline**: 多阶段顺序编排器
//! - **session**: 会话存储、回合日志、任务级对话状态与记忆召回
//! - **stages**: 推理阶段（对话结果分析 / 用户画像 / 电影推荐）
//! - **task**: 任务生命周期状态机与状态事件流
//! - **tools**: 工具注册表与分发器（向量检索、偏好读写、记忆召回）

pub mod agent;
pub mod config;
pub mod core;
pub mod guardrail;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod session;
pub mod stages;
pub mod task;
pub mod tools;
