//! 无头组件装配
//!
//! 供 CLI / 外部传输层调用的装配逻辑：create_components 按配置构建
//! LLM / 守护栏 / 工具 / 流水线，create_executor 在其上构建任务执行器。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::guardrail::{HttpPolicyClient, NoopPolicyClient, PolicyClient, SanitizationGate};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::pipeline::Pipeline;
use crate::session::{InMemorySessionStore, SessionStore};
use crate::stages::{conversation_analysis_stage, recommender_stage, user_profile_stage};
use crate::task::{ExecutorConfig, TaskExecutor};
use crate::tools::{
    GetPreferencesTool, InMemoryMovieIndex, InMemoryPreferenceStore, MovieIndex, PreferenceStore,
    RandomMoviesTool, RecallMemoryTool, SearchMoviesTool, SetPreferencesTool, ToolDispatcher,
    ToolRegistry,
};

/// 智能体名片：对外声明名称、描述与版本（传输层自取）
#[derive(Debug, Clone)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
}

pub fn agent_card() -> AgentCard {
    AgentCard {
        name: "movie_guru_agent".to_string(),
        description:
            "Executes a sequence of user profile, recommendations and sentiment analysis to return a list of movies."
                .to_string(),
        version: "1.0.0".to_string(),
    }
}

/// 预构建的组件集：可在多个任务间共享
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub gate: Arc<SanitizationGate>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub sessions: Arc<dyn SessionStore>,
    pub pipeline: Arc<Pipeline>,
}

/// 根据配置与环境变量选择生成后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "openai" && std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 根据配置构建守护栏：有端点走 REST 策略服务，否则 Noop（全部放行）
pub fn create_gate_from_config(cfg: &AppConfig) -> Arc<SanitizationGate> {
    let policy: Arc<dyn PolicyClient> = match &cfg.guardrail.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Using HTTP policy service");
            Arc::new(HttpPolicyClient::new(
                endpoint.clone(),
                cfg.guardrail.template.clone(),
                cfg.guardrail.timeout_secs,
            ))
        }
        None => {
            tracing::warn!("No policy endpoint configured, sanitization passes everything");
            Arc::new(NoopPolicyClient)
        }
    };
    Arc::new(SanitizationGate::new(
        policy,
        cfg.guardrail.inbound_replacement.clone(),
        cfg.guardrail.outbound_replacement.clone(),
    ))
}

/// 创建组件集：注册检索 / 偏好 / 发现 / 记忆工具并装配三阶段流水线
pub fn create_components(
    cfg: &AppConfig,
    index: Arc<dyn MovieIndex>,
    preferences: Arc<dyn PreferenceStore>,
    sessions: Arc<dyn SessionStore>,
) -> AgentComponents {
    let mut tools = ToolRegistry::new();
    tools.register(SearchMoviesTool::new(index.clone(), cfg.tools.search_top_k));
    tools.register(RandomMoviesTool::new(index, 3));
    tools.register(GetPreferencesTool::new(preferences.clone()));
    tools.register(SetPreferencesTool::new(preferences));
    tools.register(RecallMemoryTool::new(
        sessions.clone(),
        cfg.session.recall_top_k,
    ));

    let pipeline = Pipeline::new(
        "movie_guru_agent",
        vec![
            conversation_analysis_stage(),
            user_profile_stage(),
            recommender_stage(),
        ],
    );

    AgentComponents {
        llm: create_llm_from_config(cfg),
        gate: create_gate_from_config(cfg),
        dispatcher: Arc::new(ToolDispatcher::new(tools, cfg.tools.tool_timeout_secs)),
        sessions,
        pipeline: Arc::new(pipeline),
    }
}

/// 全内存默认装配（CLI 与测试用）
pub fn create_default_components(cfg: &AppConfig) -> AgentComponents {
    create_components(
        cfg,
        Arc::new(InMemoryMovieIndex::new()),
        Arc::new(InMemoryPreferenceStore::new()),
        Arc::new(InMemorySessionStore::new()),
    )
}

/// 在组件集上构建任务执行器
pub fn create_executor(cfg: &AppConfig, components: AgentComponents) -> TaskExecutor {
    TaskExecutor::new(
        components.pipeline,
        components.sessions,
        components.llm,
        components.gate,
        components.dispatcher,
        ExecutorConfig {
            generate_timeout_secs: cfg.llm.generate_timeout_secs,
            max_tool_rounds: cfg.tools.max_tool_rounds,
            max_context_turns: cfg.app.max_context_turns,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_components_register_all_tools() {
        let cfg = AppConfig::default();
        let components = create_default_components(&cfg);
        let mut names = components.dispatcher.tool_names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "get_random_movies",
                "get_user_preferences",
                "recall_memory",
                "search_movies",
                "set_user_preferences"
            ]
        );
        assert_eq!(
            components.pipeline.stage_names(),
            vec!["conversation_analysis", "user_profile", "recommender"]
        );
    }
}
