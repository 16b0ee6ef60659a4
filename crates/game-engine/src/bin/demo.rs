//! Scripted drive of a session: new game, a short walk, a save.
//!
//! Uses the real OpenAI backend when OPENAI_API_KEY is set; otherwise a
//! scripted client that always fails, which exercises the procedural
//! fallback path end to end.

use ai_bridge::{LlmClient, LlmError, OpenAiChatClient, ScriptedClient};
use crawler_core::CoreConfig;
use game_engine::{GameSession, PlayerAction};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let client: Arc<dyn LlmClient> = match OpenAiChatClient::new() {
        Ok(client) => Arc::new(client),
        Err(_) => {
            tracing::warn!("OPENAI_API_KEY not set; running on procedural fallbacks");
            Arc::new(ScriptedClient::always_error(LlmError::Transient("offline".into())))
        }
    };

    let session = GameSession::spawn(CoreConfig::default(), client, "./saves")?;

    let start = session
        .submit(PlayerAction::NewGame {
            player_name: Some("Hero".to_string()),
            seed: Some("demo".to_string()),
        })
        .await?;
    println!("== {} ==", start.message);
    println!("{}\n", start.updated_state.room.description);

    for _ in 0..5 {
        let state = session.submit(PlayerAction::Rest).await?;
        let exits = state.updated_state.room.exits.clone();
        let Some(direction) = exits.first().copied() else { break };
        let moved = session.submit(PlayerAction::Move { direction }).await?;
        println!("[{}] {}", moved.message, moved.narrative);
    }

    let saved = session.submit(PlayerAction::SaveGame { slot: 1 }).await?;
    println!("\n{}", saved.message);

    let metrics = session.metrics();
    for (kind, m) in &metrics.kinds {
        println!(
            "{kind}: {} requests, {} fallbacks, {} cache hits",
            m.requests, m.fallbacks, m.cache_hits
        );
    }
    Ok(())
}
