//! `weft doctor`: Diagnose configuration and storage health.

use weft_agent::patterns::planner::planner_strategy;
use weft_config::AppConfig;

use super::{setup, storage};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 weft doctor");
    println!("==============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    let config = if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ✅ Config file valid ({})", config_path.display());
                config
            }
            Err(e) => {
                println!("  ❌ Config file invalid: {e}");
                println!("\n  ⚠️  1 issue(s) found. Fix the config before running agents.");
                return Ok(());
            }
        }
    } else {
        println!("  ⚠️  No config file at {}, using defaults", config_path.display());
        println!("     `weft config --default > {}` writes one", config_path.display());
        issues += 1;
        AppConfig::default()
    };

    let agent = config.agent_config();
    let prompt = if agent.system_prompt.is_some() { "custom" } else { "no" };
    println!(
        "  ✅ Agent id: {} (max {} iterations, {prompt} system prompt)",
        config.agent.id, agent.max_iterations
    );
    match setup::model_parts(&config) {
        (Some(provider), id) => println!("  ✅ Model: {id} via {provider}"),
        (None, id) => println!("  ℹ️  Model: {id} (no provider prefix; the executor decides)"),
    }

    let planner = setup::planner_config(&config);
    match planner_strategy(planner.clone()) {
        Ok(_) => println!(
            "  ✅ Planner: up to {} replan(s), {} tool round(s) per step",
            planner.max_replans, planner.max_tool_rounds
        ),
        Err(e) => {
            println!("  ❌ Planner strategy invalid: {e}");
            issues += 1;
        }
    }

    if config.telemetry.enabled {
        println!("  ✅ Tracing enabled (keeps up to {} traces)", config.telemetry.max_traces);
    } else {
        println!("  ℹ️  Tracing disabled");
    }

    if !config.persistence.automatic {
        println!("  ℹ️  Automatic checkpoints off; only explicit checkpoints are saved");
    }
    if !config.persistence.rollback_on_start {
        println!("  ℹ️  Resume on start off; every run starts fresh");
    }

    match config.persistence.backend.as_str() {
        "none" => {
            println!("  ⚠️  Checkpoints disabled (backend = \"none\"); failed runs cannot resume");
            issues += 1;
        }
        "memory" => {
            println!("  ⚠️  In-memory checkpoints do not survive the process");
            issues += 1;
        }
        _ => {}
    }

    match storage::open(&config).await {
        Ok(store) => match store.get_checkpoints(&config.agent.id).await {
            Ok(checkpoints) => println!(
                "  ✅ {} storage readable ({} checkpoint(s) for {})",
                store.name(),
                checkpoints.len(),
                config.agent.id
            ),
            Err(e) => {
                println!("  ❌ {} storage unreadable: {e}", store.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Cannot open checkpoint storage: {e}");
            issues += 1;
        }
    }

    if config.persistence.backend == "file" {
        let dir = config.persistence.checkpoint_dir();
        if dir.exists() {
            println!("  ✅ Checkpoint directory exists ({})", dir.display());
        } else {
            println!("  ℹ️  Checkpoint directory {} is created on first save", dir.display());
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
