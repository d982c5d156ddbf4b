//! Weft CLI: the main entry point.
//!
//! Commands:
//! - `build`    Assemble a context snapshot for one message
//! - `handoff`  Brief one agent on another agent's thread
//! - `tokens`   Estimate token usage of a session against a model
//! - `config`   Show or validate configuration

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "weft",
    about = "Weft: conversation context engine for multi-agent assistants",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.weft/config.toml
    #[arg(long, global = true, env = "WEFT_CONFIG")]
    config: Option<PathBuf>,
}

/// Identity of an agent taking part in a command.
#[derive(Args, Clone)]
pub struct AgentArgs {
    /// Agent id
    #[arg(long = "agent", default_value = "assistant")]
    pub id: String,

    /// Agent type
    #[arg(long = "agent-type", default_value = "general")]
    pub agent_type: String,

    /// Display name (defaults to the id)
    #[arg(long = "agent-name")]
    pub name: Option<String>,

    /// System prompt
    #[arg(long = "prompt")]
    pub prompt: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the context snapshot for a message
    Build {
        /// Message to build context for
        #[arg(short, long)]
        message: String,

        /// Thread id (a fresh one is generated if omitted)
        #[arg(short, long)]
        thread: Option<String>,

        #[arg(short, long, default_value = "local")]
        user: String,

        #[command(flatten)]
        agent: AgentArgs,

        /// Session file seeding history, memories, documents and shared data
        #[arg(short, long)]
        session: Option<PathBuf>,

        /// Target model (defaults to the configured model)
        #[arg(long)]
        model: Option<String>,

        /// Skip documents and shared data
        #[arg(long)]
        bare: bool,

        /// Print the whole snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Hand a thread over from one agent to another
    Handoff {
        /// Source thread
        #[arg(long)]
        from_thread: String,

        /// Target thread (defaults to the source thread)
        #[arg(long)]
        to_thread: Option<String>,

        #[arg(short, long, default_value = "local")]
        user: String,

        /// Source agent id
        #[arg(long)]
        from: String,

        /// Source agent system prompt
        #[arg(long)]
        from_prompt: String,

        /// Target agent id
        #[arg(long)]
        to: String,

        /// Session file seeding the source thread
        #[arg(short, long)]
        session: Option<PathBuf>,

        /// Latest user message in the source thread
        #[arg(short, long)]
        message: String,

        /// Also publish the structured package and print it
        #[arg(long)]
        sync: bool,
    },

    /// Estimate token usage of a session
    Tokens {
        /// Session file to measure
        session: PathBuf,

        /// Model whose window to compare against
        #[arg(long)]
        model: Option<String>,
    },

    /// Configuration management
    Config {
        /// Validate the active configuration instead of printing defaults
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Build {
            message,
            thread,
            user,
            agent,
            session,
            model,
            bare,
            json,
        } => {
            commands::build::run(commands::build::BuildArgs {
                config_path,
                message,
                thread,
                user,
                agent,
                session,
                model,
                bare,
                json,
            })
            .await?
        }
        Commands::Handoff {
            from_thread,
            to_thread,
            user,
            from,
            from_prompt,
            to,
            session,
            message,
            sync,
        } => {
            commands::handoff::run(commands::handoff::HandoffArgs {
                config_path,
                from_thread,
                to_thread,
                user,
                from,
                from_prompt,
                to,
                session,
                message,
                sync,
            })
            .await?
        }
        Commands::Tokens { session, model } => {
            commands::tokens::run(config_path, &session, model)?
        }
        Commands::Config { validate } => {
            if validate {
                commands::config_cmd::validate(config_path)?
            } else {
                commands::config_cmd::show_default()
            }
        }
    }

    Ok(())
}
