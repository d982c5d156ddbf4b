//! `weft tokens`: measure a session against a model's budget.

use crate::commands::session::{SessionFile, load_config};
use std::path::Path;
use std::sync::Arc;
use weft_context::TokenBudgetManager;
use weft_providers::OpenAiCompatProvider;

pub fn run(
    config_path: Option<&Path>,
    session: &Path,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let session = SessionFile::load(session)?;
    let model = model.unwrap_or_else(|| config.default_model.clone());

    let summarizer = Arc::new(OpenAiCompatProvider::from_config(
        &config.provider,
        config.summary_model(),
    ));
    let budget = TokenBudgetManager::from_config(summarizer, &config);
    let stats = budget.stats(&session.turns, &model);

    println!("Model:        {model}");
    println!("Window:       {}", stats.max_tokens);
    println!("Usable:       {}", budget.usable_budget(&model));
    println!("Turns:        {}", session.turns.len());
    println!("Tokens:       {}", stats.current_tokens);
    println!("Usage:        {:.1}%", stats.usage_percentage);
    println!(
        "Compression:  {}",
        if budget.should_compress(&session.turns, &model) {
            "would be considered"
        } else {
            "not needed"
        }
    );

    Ok(())
}
