//! `weft checkpoints`: Inspect saved checkpoints.

use std::fmt::Write as _;

use weft_config::AppConfig;
use weft_core::checkpoint::AgentCheckpointData;
use weft_persistence::Persistency;

use super::{setup, storage};

fn load_config(agent: Option<String>) -> Result<(AppConfig, String), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let agent_id = agent.unwrap_or_else(|| config.agent.id.clone());
    Ok((config, agent_id))
}

pub async fn list(agent: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent_id) = load_config(agent)?;
    let storage = storage::open(&config).await?;

    let mut checkpoints = storage.get_checkpoints(&agent_id).await?;
    checkpoints.sort_by_key(|c| c.created_at);

    println!("📍 Checkpoints for {agent_id} ({} storage)", storage.name());
    if checkpoints.is_empty() {
        println!("   None saved.");
        let others = storage::agent_ids(&config).await?;
        if !others.is_empty() {
            println!("   Agents with checkpoints: {}", others.join(", "));
        }
        return Ok(());
    }
    print!("{}", render_table(&checkpoints));
    Ok(())
}

pub async fn latest(agent: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent_id) = load_config(agent)?;
    let storage = storage::open(&config).await?;

    match storage.get_latest_checkpoint(&agent_id).await? {
        Some(cp) => print!("{}", render_detail(&cp)),
        None => println!("No checkpoints for {agent_id}"),
    }
    Ok(())
}

pub async fn show(agent: Option<String>, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent_id) = load_config(agent)?;
    let storage = storage::open(&config).await?;

    let cp = storage
        .get_checkpoint(&agent_id, id)
        .await?
        .ok_or_else(|| format!("Checkpoint {id} not found for agent {agent_id}"))?;
    print!("{}", render_detail(&cp));
    Ok(())
}

pub async fn resume(agent: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent_id) = load_config(agent)?;
    let storage = storage::open(&config).await?;
    let persistency = Persistency::new(setup::persistency_config(&config, storage));
    print!("{}", describe_resume(&persistency, &agent_id).await?);
    Ok(())
}

async fn describe_resume(persistency: &Persistency, agent_id: &str) -> Result<String, Box<dyn std::error::Error>> {
    if !persistency.rollback_on_start() {
        return Ok(format!(
            "Resume on start is disabled (persistence.rollback_on_start); runs of {agent_id} start fresh.\n"
        ));
    }
    let out = match persistency.resume_point(agent_id).await? {
        Some((cp, input)) => format!(
            "Next run of {agent_id} resumes at {} with {} input ({} messages, checkpoint {}).\n",
            cp.node_id,
            input.kind(),
            cp.message_history.len(),
            cp.checkpoint_id,
        ),
        None => format!("Next run of {agent_id} starts fresh.\n"),
    };
    Ok(out)
}

fn render_table(checkpoints: &[AgentCheckpointData]) -> String {
    let mut out = String::new();
    for cp in checkpoints {
        let marker = if cp.is_tombstone() { " (finished)" } else { "" };
        let _ = writeln!(
            out,
            "  {}  {:<36}  {:<20}  {:>3} msgs{marker}",
            cp.created_at.format("%Y-%m-%d %H:%M:%S%.6f"),
            cp.checkpoint_id,
            cp.node_id,
            cp.message_history.len(),
        );
    }
    out
}

fn render_detail(cp: &AgentCheckpointData) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Checkpoint: {}", cp.checkpoint_id);
    let _ = writeln!(out, "  Agent:    {}", cp.agent_id);
    let _ = writeln!(out, "  Node:     {}", cp.node_id);
    let _ = writeln!(out, "  Created:  {}", cp.created_at.to_rfc3339());
    if cp.is_tombstone() {
        let _ = writeln!(out, "  Run finished; the next run starts fresh.");
        return out;
    }
    let input = serde_json::to_string_pretty(&cp.last_input).unwrap_or_else(|_| cp.last_input.to_string());
    let _ = writeln!(out, "  Input:    {input}");
    let _ = writeln!(out, "  History ({} messages):", cp.message_history.len());
    for (i, message) in cp.message_history.iter().enumerate() {
        let content = message.content();
        let preview: String = content.chars().take(80).collect();
        let ellipsis = if content.chars().count() > 80 { "…" } else { "" };
        let _ = writeln!(out, "    {i:>2}. [{}] {preview}{ellipsis}", message.role());
    }
    out
}
