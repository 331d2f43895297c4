//! `ctxrelay filter` and `ctxrelay amplify`.

use std::path::Path;
use std::sync::Arc;

use ctxrelay_config::AppConfig;
use ctxrelay_orchestrator::ContextRelay;
use ctxrelay_vault::Vault;

use super::load_config;

/// Answer commands never touch the vault.
fn relay(config_path: Option<&Path>) -> Result<ContextRelay, Box<dyn std::error::Error>> {
    let config: AppConfig = load_config(config_path)?;
    Ok(ContextRelay::with_vault(&config, Arc::new(Vault::in_memory()))?)
}

pub async fn filter(
    config_path: Option<&Path>,
    question: &str,
    answers: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let relay = relay(config_path)?;
    let result = relay.filter_answers(answers, question)?;

    println!("🏆 Best answer (#{}):", result.ranking[0].index + 1);
    println!("   {}\n", result.answer);
    println!("   Score:       {:.3}", result.score.overall);
    println!("   Confidence:  {:.3}\n", result.confidence);

    println!("  #   overall  relev  compl  struc  conf   contr  align  spec   evid");
    for ranked in &result.ranking {
        let s = &ranked.score;
        println!(
            "  {:<3} {:<8.3} {:<6.2} {:<6.2} {:<6.2} {:<6.2} {:<6.2} {:<6.2} {:<6.2} {:<6.2}",
            ranked.index + 1,
            s.overall,
            s.relevance,
            s.completeness,
            s.structure,
            s.confidence,
            s.contradiction,
            s.context_alignment,
            s.specificity,
            s.evidence,
        );
    }
    Ok(())
}

pub async fn amplify(
    config_path: Option<&Path>,
    question: &str,
    answer: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let relay = relay(config_path)?;
    println!("{}", relay.amplify(answer, question));
    Ok(())
}
