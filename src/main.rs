//! Detective - conversational agent CLI
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use detective::cli::render_trace;
use detective::core::logging::init_logging;
use detective::observability::JsonlTraceExporter;
use detective::store::{ConversationStore, FileConversationStore};
use detective::{Agent, Config, Repl};

/// Detective - conversational agent with tools, tracing and persistence
#[derive(Parser, Debug)]
#[command(name = "detective")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a config file (defaults to the user config directory)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,

    /// Resume a saved conversation by id
    #[arg(long, short = 'r')]
    resume: Option<String>,

    /// List saved conversations and exit
    #[arg(long)]
    list: bool,

    /// Print the span tree of a trace and exit
    #[arg(long, value_name = "TRACE_ID")]
    trace: Option<String>,

    /// Write a default config file and exit
    #[arg(long)]
    init: bool,

    /// Enable debug logging
    #[arg(long, short = 'd')]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init {
        let existing = Config::config_file();
        if existing.exists() {
            println!("{} already exists. Defaults:\n", existing.display());
            println!("{}", Config::default_config_toml());
            return Ok(());
        }
        let path = Config::default().save().context("writing default config")?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging);

    if let Some(trace_id) = args.trace {
        let spans = JsonlTraceExporter::new(&config.storage.trace_dir)
            .load(&trace_id)
            .with_context(|| format!("loading trace {}", trace_id))?;
        println!("{}", render_trace(&trace_id, spans));
        return Ok(());
    }

    if args.list {
        let store = FileConversationStore::new(&config.storage.conversation_dir);
        for id in store.list().await? {
            println!("{}", id);
        }
        return Ok(());
    }

    let mut agent = Agent::from_config(&config).context("creating agent")?;
    if let Some(id) = &args.resume {
        agent
            .resume(id)
            .await
            .with_context(|| format!("resuming conversation {}", id))?;
    }

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let reply = agent.send_message(&prompt).await?;
        println!("{}", reply);
        return Ok(());
    }

    // Interactive REPL mode
    let trace_dir = config
        .storage
        .export_traces
        .then(|| config.storage.trace_dir.clone());
    let mut repl = Repl::new(agent, trace_dir);
    repl.run().await?;

    Ok(())
}
