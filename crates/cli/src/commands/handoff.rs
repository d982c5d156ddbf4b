//! `weft handoff`: brief a second agent on a thread.
//!
//! The source agent first builds its context for the latest message, so the
//! handoff has a snapshot to draw from.

use crate::commands::session::{SessionFile, load_config, local_builder};
use std::path::{Path, PathBuf};
use weft_context::{BuildOptions, HandoffCoordinator};
use weft_core::agent::AgentProfile;

pub struct HandoffArgs<'a> {
    pub config_path: Option<&'a Path>,
    pub from_thread: String,
    pub to_thread: Option<String>,
    pub user: String,
    pub from: String,
    pub from_prompt: String,
    pub to: String,
    pub session: Option<PathBuf>,
    pub message: String,
    pub sync: bool,
}

pub async fn run(args: HandoffArgs<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config_path)?;
    let session = SessionFile::load_optional(args.session.as_deref())?;
    let builder = local_builder(&config, &args.from_thread, session).await?;

    let source = AgentProfile::new(&args.from, &args.from, &args.from)
        .with_system_prompt(&args.from_prompt);
    let target = AgentProfile::new(&args.to, &args.to, &args.to);

    builder
        .build(
            &args.from_thread,
            &args.user,
            &source,
            &args.message,
            &BuildOptions::default(),
        )
        .await?;

    let coordinator = HandoffCoordinator::for_builder(&builder);
    println!("{}", coordinator.build_handoff(&args.from_thread, &source, &target));

    if args.sync {
        let to_thread = args.to_thread.as_deref().unwrap_or(&args.from_thread);
        let package = coordinator
            .sync(&args.from_thread, to_thread, &source, &target, None)
            .await?;
        println!();
        println!("{}", serde_json::to_string_pretty(&package)?);
    }

    Ok(())
}
