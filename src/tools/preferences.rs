//! 用户偏好工具：读取与写入
//!
//! 偏好按用户键存储；「谁的偏好」一律取自 ToolContext 注入的调用方身份，
//! 工具参数中不接受用户 ID。无偏好记录时返回空映射，这是合法结果而非错误。

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::tools::{json_schema_of, Tool, ToolContext};

/// 偏好存储 trait
///
/// 期望的偏好结构：
/// {"likes": {"actors": [], "directors": [], "genres": [], "others": []},
///  "dislikes": {"actors": [], "directors": [], "genres": [], "others": []}}
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// 读取用户偏好；不存在返回空对象
    async fn get(&self, user: &str) -> Result<Value, String>;

    /// 创建或更新用户偏好
    async fn set(&self, user: &str, preferences: Value) -> Result<(), String>;
}

/// 进程内偏好存储
#[derive(Default)]
pub struct InMemoryPreferenceStore {
    prefs: RwLock<HashMap<String, Value>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, user: &str) -> Result<Value, String> {
        Ok(self
            .prefs
            .read()
            .await
            .get(user)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    async fn set(&self, user: &str, preferences: Value) -> Result<(), String> {
        self.prefs
            .write()
            .await
            .insert(user.to_string(), preferences);
        Ok(())
    }
}

/// 读取偏好工具：无参数，身份取自执行上下文
pub struct GetPreferencesTool {
    store: Arc<dyn PreferenceStore>,
}

impl GetPreferencesTool {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetPreferencesTool {
    fn name(&self) -> &str {
        "get_user_preferences"
    }

    fn description(&self) -> &str {
        "Retrieves the calling user's movie preferences. No args."
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let prefs = self.store.get(&ctx.caller.user).await?;
        tracing::debug!(user = %ctx.caller.user, "preferences read");
        Ok(prefs)
    }
}

/// set_user_preferences 的参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetPreferencesArgs {
    /// 完整的偏好映射（likes / dislikes）
    pub preferences: Value,
}

/// 写入偏好工具：upsert，身份取自执行上下文
pub struct SetPreferencesTool {
    store: Arc<dyn PreferenceStore>,
}

impl SetPreferencesTool {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetPreferencesTool {
    fn name(&self) -> &str {
        "set_user_preferences"
    }

    fn description(&self) -> &str {
        "Creates or updates the calling user's movie preferences. Args: {\"preferences\": {...}}"
    }

    fn parameters_schema(&self) -> Value {
        json_schema_of::<SetPreferencesArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let args: SetPreferencesArgs =
            serde_json::from_value(args).map_err(|e| e.to_string())?;
        self.store.set(&ctx.caller.user, args.preferences).await?;
        tracing::debug!(user = %ctx.caller.user, "preferences upserted");
        Ok(json!(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;

    fn ctx_for(user: &str) -> ToolContext {
        ToolContext::new(SessionKey::new("movie-guru", user, "session-1"))
    }

    #[tokio::test]
    async fn test_get_missing_returns_empty_mapping() {
        let store = Arc::new(InMemoryPreferenceStore::new());
        let tool = GetPreferencesTool::new(store);
        let prefs = tool.execute(json!({}), &ctx_for("nobody")).await.unwrap();
        assert_eq!(prefs, json!({}));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = Arc::new(InMemoryPreferenceStore::new());
        let set_tool = SetPreferencesTool::new(store.clone());
        let get_tool = GetPreferencesTool::new(store);

        let prefs = json!({"likes": {"genres": ["sci-fi"]}, "dislikes": {"genres": ["romantic comedy"]}});
        set_tool
            .execute(json!({"preferences": prefs}), &ctx_for("user-1"))
            .await
            .unwrap();

        let read = get_tool.execute(json!({}), &ctx_for("user-1")).await.unwrap();
        assert_eq!(read["likes"]["genres"][0], "sci-fi");
    }

    #[tokio::test]
    async fn test_identity_comes_from_context_not_args() {
        let store = Arc::new(InMemoryPreferenceStore::new());
        store.set("victim", json!({"likes": {}})).await.unwrap();

        let get_tool = GetPreferencesTool::new(store);
        // 参数里塞入他人用户 ID 不起作用，读到的是调用方自己的（空）偏好
        let read = get_tool
            .execute(json!({"user": "victim"}), &ctx_for("attacker"))
            .await
            .unwrap();
        assert_eq!(read, json!({}));
    }
}
