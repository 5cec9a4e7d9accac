//! 会话存储：按 (应用, 用户, 会话) 三元组保存只追加的回合日志
//!
//! 会话归外部存储所有，编排核心只引用不删除；首次使用时按三元组创建。
//! InMemorySessionStore 为进程内实现（关键词重叠召回），
//! 生产部署可替换为数据库后端的实现。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::session::tokenizer::{overlap_score, tokenize_to_set};

/// 回合角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

/// 会话日志中的单个回合
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 会话标识：(应用, 用户, 会话) 三元组
///
/// 同时充当请求级调用方身份：由请求上下文注入并沿调用链透传，
/// 永远不作为工具参数出现，调用方无法伪造他人身份。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app: String,
    pub user: String,
    pub session: String,
}

impl SessionKey {
    pub fn new(
        app: impl Into<String>,
        user: impl Into<String>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            user: user.into(),
            session: session.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app, self.user, self.session)
    }
}

/// 一个会话：三元组 + 只追加的回合日志
#[derive(Clone, Debug)]
pub struct Session {
    pub key: SessionKey,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// 会话存储 trait：读取 / 创建 / 追加回合 / 记忆召回
///
/// 每个方法视为至多一次的外部调用，核心不在其上施加事务语义。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 按三元组读取会话；不存在返回 Ok(None)
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, String>;

    /// 按三元组创建会话
    async fn create_session(&self, key: &SessionKey) -> Result<Session, String>;

    /// 向会话日志追加一个回合
    async fn append_turn(&self, key: &SessionKey, turn: Turn) -> Result<(), String>;

    /// 按查询召回该会话中最相关的 k 个历史回合
    async fn recall_memory(
        &self,
        key: &SessionKey,
        query: &str,
        k: usize,
    ) -> Result<Vec<Turn>, String>;

    /// 读取会话，不存在则创建（NOT_FOUND 走创建路径）
    async fn resolve(&self, key: &SessionKey) -> Result<Session, String> {
        match self.get_session(key).await? {
            Some(session) => Ok(session),
            None => self.create_session(key).await,
        }
    }
}

/// 进程内会话存储：HashMap + 关键词重叠召回
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, String> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn create_session(&self, key: &SessionKey) -> Result<Session, String> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(key.clone()));
        Ok(session.clone())
    }

    async fn append_turn(&self, key: &SessionKey, turn: Turn) -> Result<(), String> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| format!("Session not found: {}", key))?;
        session.turns.push(turn);
        Ok(())
    }

    async fn recall_memory(
        &self,
        key: &SessionKey,
        query: &str,
        k: usize,
    ) -> Result<Vec<Turn>, String> {
        let query_tokens = tokenize_to_set(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let sessions = self.sessions.read().await;
        let session = match sessions.get(key) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        let mut scored: Vec<(usize, &Turn)> = session
            .turns
            .iter()
            .map(|turn| {
                let doc_tokens = tokenize_to_set(&turn.content);
                (overlap_score(&query_tokens, &doc_tokens), turn)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, t)| t.clone()).collect())
    }
}
