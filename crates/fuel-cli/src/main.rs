mod consume_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fuel_core::context::FuelContext;

#[derive(Parser)]
#[command(name = "fuel", about = "Autonomous task-execution supervisor for fleets of LLM coding agents")]
struct Cli {
    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the `.fuel/` workspace layout: directories, an empty config.yaml, .gitignore
    Init,
    /// Run the consume daemon, or control an already-running one
    Consume {
        #[command(subcommand)]
        action: Option<ConsumeAction>,
        /// Port to bind the IPC server to (overrides config.yaml)
        #[arg(long)]
        port: Option<u16>,
        /// Accepted for interface compatibility; see DESIGN.md for why this is a no-op
        #[arg(long)]
        foreground: bool,
    },
}

#[derive(Subcommand)]
enum ConsumeAction {
    /// Ask a running daemon to shut down
    Stop {
        /// Wait for in-flight agents to finish before exiting
        #[arg(long)]
        graceful: bool,
    },
    /// Report whether a daemon is running and print its snapshot
    Status,
}

fn cmd_init(ctx: &FuelContext) -> anyhow::Result<()> {
    ctx.init_layout()?;

    let gitignore = ctx.gitignore_path();
    let entry = ".fuel/agent.db\n.fuel/agent.db-*\n.fuel/consume.pid\n.fuel/consume.pid.lock\n";
    let existing = std::fs::read_to_string(&gitignore).unwrap_or_default();
    if !existing.contains(".fuel/agent.db") {
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(entry);
        std::fs::write(&gitignore, updated)?;
    }

    println!("Initialized .fuel/ workspace at {}", ctx.fuel_dir.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let ctx = FuelContext::new(root);

    match cli.command {
        Commands::Init => cmd_init(&ctx)?,
        Commands::Consume { action: None, port, foreground: _ } => {
            consume_cmd::run_start(&ctx, port).await?;
        }
        Commands::Consume { action: Some(ConsumeAction::Stop { graceful }), .. } => {
            consume_cmd::run_stop(&ctx, graceful).await?;
        }
        Commands::Consume { action: Some(ConsumeAction::Status), .. } => {
            consume_cmd::run_status(&ctx).await?;
        }
    }

    Ok(())
}
