//! Reel - Rust 对话式电影推荐智能体
//!
//! 入口：初始化日志、按配置装配组件与任务执行器，stdin 循环提交任务并打印状态事件。

use std::io::Write;

use anyhow::Context;
use reel::agent::{agent_card, create_default_components, create_executor};
use reel::config::load_config;
use reel::session::SessionKey;
use reel::task::TaskState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    reel::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let card = agent_card();
    println!("{} v{} - {}", card.name, card.version, card.description);

    let components = create_default_components(&cfg);
    let executor = create_executor(&cfg, components);

    let caller = SessionKey::new(
        cfg.app.name.clone().unwrap_or_else(|| "reel".to_string()),
        std::env::var("USER").unwrap_or_else(|_| "local".to_string()),
        format!("cli_{}", uuid::Uuid::new_v4()),
    );

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line).context("stdin read failed")? == 0 {
            break; // EOF
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }

        let mut handle = executor.submit(caller.clone(), input).await;
        while let Some(event) = handle.events.recv().await {
            match event.state {
                TaskState::Completed => {
                    println!("{}", event.message.as_deref().unwrap_or("(no artifact)"));
                    break;
                }
                TaskState::Failed => {
                    println!("Task failed: {}", event.message.as_deref().unwrap_or("unknown"));
                    break;
                }
                state => {
                    tracing::debug!(?state, "status event");
                }
            }
        }
    }

    Ok(())
}
