//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REEL__*` 覆盖（双下划线表示嵌套，如 `REEL__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub guardrail: GuardrailSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// [app] 段：应用名与上下文回合数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 播种到对话状态的历史回合数上限
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    20
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；无 API Key 时回退 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次生成调用超时（秒），超时对阶段致命
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            generate_timeout_secs: default_generate_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generate_timeout_secs() -> u64 {
    60
}

/// [guardrail] 段：策略服务端点与替换文案
///
/// endpoint 未设置时守护栏使用 Noop 策略客户端（全部放行）。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardrailSection {
    /// 策略服务 REST 端点（如 https://modelarmor.example.com）
    pub endpoint: Option<String>,
    /// 策略模板 ID
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_policy_timeout_secs")]
    pub timeout_secs: u64,
    /// 入站命中时的替换文案
    #[serde(default = "default_inbound_replacement")]
    pub inbound_replacement: String,
    /// 出站命中时的替换文案
    #[serde(default = "default_outbound_replacement")]
    pub outbound_replacement: String,
}

impl Default for GuardrailSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            template: default_template(),
            timeout_secs: default_policy_timeout_secs(),
            inbound_replacement: default_inbound_replacement(),
            outbound_replacement: default_outbound_replacement(),
        }
    }
}

fn default_template() -> String {
    "reel-default".to_string()
}

fn default_policy_timeout_secs() -> u64 {
    5
}

fn default_inbound_replacement() -> String {
    "The user's prompt has been flagged to violate policies of movie-guru".to_string()
}

fn default_outbound_replacement() -> String {
    "The model's response has been flagged to violate policies of movie-guru".to_string()
}

/// [tools] 段：工具超时、检索条数、单阶段工具轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 向量检索返回条数
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,
    /// 单个阶段内模型可发起的工具调用轮数上限，防止死循环
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search_top_k: default_search_top_k(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_search_top_k() -> usize {
    5
}

fn default_max_tool_rounds() -> usize {
    4
}

/// [session] 段：记忆召回条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            recall_top_k: default_recall_top_k(),
        }
    }
}

fn default_recall_top_k() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            guardrail: GuardrailSection::default(),
            tools: ToolsSection::default(),
            session: SessionSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 REEL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REEL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REEL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
