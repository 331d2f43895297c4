//! `ctxrelay demo`: Two contexts, one transition, and the resulting momentum.

use std::path::Path;
use std::sync::Arc;

use ctxrelay_core::context::{StateMap, TransitionData};
use ctxrelay_orchestrator::ContextRelay;
use ctxrelay_vault::Vault;
use serde_json::json;

use super::load_config;

fn state(value: serde_json::Value) -> StateMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => StateMap::new(),
    }
}

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let mut relay = ContextRelay::with_vault(&config, Arc::new(Vault::in_memory()))?;

    println!("🔐 ctxrelay demo (in-memory vault)\n");

    let research = relay.create_context(
        "chatgpt",
        state(json!({
            "task": "research rust ownership and borrowing",
            "steps": ["read the book chapter", "write examples", "compare with C++"],
            "confidence": 0.7
        })),
    )?;
    let drafting = relay.create_context(
        "claude",
        state(json!({
            "task": "draft an article on rust ownership",
            "analysis": {"audience": "backend developers"}
        })),
    )?;
    println!("✅ Created contexts:\n   {research} (chatgpt)\n   {drafting} (claude)");

    relay.transition(&research, TransitionData::with_reason("start research"));
    relay.update_state(state(json!({"conclusions": ["ownership prevents data races"]})))?;
    relay.transition(
        &drafting,
        TransitionData {
            reason: Some("move to drafting".into()),
            transfer_state: true,
        },
    );
    println!("✅ Transitioned chatgpt → claude, carrying state across\n");

    if let Some(vector) = relay.current_momentum() {
        let f = vector.factors;
        println!("📈 Momentum for {}", vector.context_id);
        println!("   temporal     {:.3}", f.temporal);
        println!("   semantic     {:.3}", f.semantic);
        println!("   operational  {:.3}", f.operational);
        println!("   depth        {:.3}", f.depth);
        println!("   confidence   {:.3}", f.confidence);
        println!("   overall      {:.3}\n", vector.overall);
    }

    if let Some(active) = relay.get_active_context() {
        println!("🧠 Active state:");
        println!("{}\n", serde_json::to_string_pretty(&active.state)?);
    }

    let stats = relay.stats();
    println!("📊 Stats");
    println!("   contexts     {}", stats.bridge.contexts);
    println!("   transitions  {}", stats.bridge.transitions);
    println!("   mean momentum {:.3}", stats.momentum.mean_overall);

    relay.shutdown().await;
    Ok(())
}
