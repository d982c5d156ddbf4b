//! `weft build`: assemble and print a context snapshot.

use crate::AgentArgs;
use crate::commands::session::{SessionFile, load_config, local_builder};
use std::path::{Path, PathBuf};
use weft_context::BuildOptions;
use weft_core::agent::AgentProfile;

pub struct BuildArgs<'a> {
    pub config_path: Option<&'a Path>,
    pub message: String,
    pub thread: Option<String>,
    pub user: String,
    pub agent: AgentArgs,
    pub session: Option<PathBuf>,
    pub model: Option<String>,
    pub bare: bool,
    pub json: bool,
}

impl AgentArgs {
    pub fn profile(&self) -> AgentProfile {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let profile = AgentProfile::new(&self.id, &self.agent_type, name);
        match &self.prompt {
            Some(prompt) => profile.with_system_prompt(prompt),
            None => profile,
        }
    }
}

pub async fn run(args: BuildArgs<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config_path)?;
    let session = SessionFile::load_optional(args.session.as_deref())?;
    let thread_id = args
        .thread
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let builder = local_builder(&config, &thread_id, session).await?;
    let options = BuildOptions {
        force_refresh: true,
        include_documents: !args.bare,
        include_shared_context: !args.bare,
        model: args.model,
    };

    let snapshot = builder
        .build(
            &thread_id,
            &args.user,
            &args.agent.profile(),
            &args.message,
            &options,
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let stats = &snapshot.token_stats;
    println!("Thread:    {} (version {})", snapshot.thread_id, snapshot.version);
    println!(
        "Tokens:    {} / {} ({:.1}% of usable budget)",
        stats.current_tokens, stats.max_tokens, stats.usage_percentage
    );
    println!("Compressed: {}", if snapshot.compressed { "yes" } else { "no" });
    println!(
        "Memories:  {} ({})",
        snapshot.memories.len(),
        if snapshot.memory_injected { "injected" } else { "not injected" }
    );
    if let Some(documents) = &snapshot.document_context {
        println!();
        println!("{documents}");
    }
    println!();
    for turn in &snapshot.history {
        println!("[{}] {}", turn.role, turn.content);
    }

    Ok(())
}
