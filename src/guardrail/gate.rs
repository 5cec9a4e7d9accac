//! 净化门：拦截入站提示与出站回复，返回裁决
//!
//! 命中策略时裁决携带替换文本，调用方必须用其替换原文并停止转发原文；
//! 策略服务出错或不可达时 fail-open（放行），只记降级日志，不升级为任务失败。

use std::sync::Arc;

use crate::guardrail::PolicyClient;

/// 检查方向：入站（用户提示）或出站（模型回复），分别对应不同的策略模板
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// 净化裁决
///
/// 不变量：passed 为 false 时 replacement_text 一定存在。
#[derive(Clone, Debug)]
pub struct Verdict {
    pub passed: bool,
    pub replacement_text: Option<String>,
    pub reason: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            passed: true,
            replacement_text: None,
            reason: None,
        }
    }

    fn flagged(replacement: String, reason: Option<String>) -> Self {
        Self {
            passed: false,
            replacement_text: Some(replacement),
            reason,
        }
    }

    /// 替换文本（仅 passed 为 false 时存在）
    pub fn replacement(&self) -> Option<&str> {
        self.replacement_text.as_deref()
    }
}

/// 净化门：持有策略客户端与两个方向的替换文案，自身无可变状态
pub struct SanitizationGate {
    policy: Arc<dyn PolicyClient>,
    inbound_replacement: String,
    outbound_replacement: String,
}

impl SanitizationGate {
    pub fn new(
        policy: Arc<dyn PolicyClient>,
        inbound_replacement: impl Into<String>,
        outbound_replacement: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            inbound_replacement: inbound_replacement.into(),
            outbound_replacement: outbound_replacement.into(),
        }
    }

    /// 检查文本；命中返回带替换文本的裁决，策略服务失败时放行（fail-open）
    pub async fn inspect(&self, text: &str, direction: Direction) -> Verdict {
        match self.policy.check(text, direction).await {
            Ok(Some(reason)) => {
                tracing::info!(?direction, reason = %reason, "sanitization flagged text");
                let replacement = match direction {
                    Direction::Inbound => self.inbound_replacement.clone(),
                    Direction::Outbound => self.outbound_replacement.clone(),
                };
                Verdict::flagged(replacement, Some(reason))
            }
            Ok(None) => Verdict::pass(),
            Err(e) => {
                // 降级事件：可用性优先于阻塞，放行并记日志
                tracing::warn!(?direction, error = %e, "policy service degraded, failing open");
                Verdict::pass()
            }
        }
    }
}
