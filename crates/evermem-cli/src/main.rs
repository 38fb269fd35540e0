mod cmd_bridge;
mod cmd_groups;
mod cmd_history;
mod cmd_search;
mod cmd_serve;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "evermem", version, about = "Long-term memory for Claude Code sessions")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hook entrypoint (called by Claude Code hooks)
    Hook {
        #[command(subcommand)]
        cmd: HookCmd,
    },
    /// Search stored memories for the current project
    Search {
        /// Query text
        query: Vec<String>,
        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a past session transcript
    History {
        #[command(subcommand)]
        cmd: HistoryCmd,
    },
    /// Bridge operations (install/uninstall hooks for Claude Code)
    Bridge {
        #[command(subcommand)]
        cmd: BridgeCmd,
    },
    /// Check installation health
    Doctor,
    /// MCP server (stdio transport)
    Mcp {
        #[command(subcommand)]
        cmd: McpCommand,
    },
    /// Run the local dashboard proxy
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port (default: EVERMEM_PROXY_PORT or 3456)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List projects recorded for the configured API key
    Groups {
        /// Show groups for every key
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HookCmd {
    /// Claude Code hook (reads the hook payload from stdin)
    Claude,
}

#[derive(Subcommand)]
enum HistoryCmd {
    /// Extract every Q&A pair into the preview file
    Extract {
        /// Transcript path (default: `transcript_path` from a hook payload on stdin)
        path: Option<PathBuf>,
    },
    /// Upload the preview file, then delete it
    Upload,
    /// Extract and upload in one step
    Add {
        /// Transcript path (default: `transcript_path` from a hook payload on stdin)
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BridgeCmd {
    /// Claude Code integration
    Claude {
        #[command(subcommand)]
        cmd: BridgeClaudeCmd,
    },
}

#[derive(Subcommand)]
enum BridgeClaudeCmd {
    /// Install hooks and the MCP server into .claude/settings.local.json
    Install,
    /// Remove hooks and the MCP server
    Uninstall,
}

#[derive(Subcommand)]
enum McpCommand {
    /// Start the MCP server on stdio
    Serve,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match &cli.cmd {
        Command::Hook { .. } => logging::init_hook(),
        _ => logging::init_cli(),
    }

    match cli.cmd {
        Command::Hook { cmd } => match cmd {
            HookCmd::Claude => cmd_bridge::hook_claude(),
        },
        Command::Search { query, limit, json } => cmd_search::execute(&cwd, &query.join(" "), limit, json),
        Command::History { cmd } => match cmd {
            HistoryCmd::Extract { path } => cmd_history::extract(path),
            HistoryCmd::Upload => cmd_history::upload(&cwd),
            HistoryCmd::Add { path } => cmd_history::add(&cwd, path),
        },
        Command::Bridge { cmd } => match cmd {
            BridgeCmd::Claude { cmd } => match cmd {
                BridgeClaudeCmd::Install => cmd_bridge::install(&cwd),
                BridgeClaudeCmd::Uninstall => cmd_bridge::uninstall(&cwd),
            },
        },
        Command::Doctor => cmd_bridge::doctor(&cwd),
        Command::Mcp { cmd } => match cmd {
            McpCommand::Serve => {
                let config = evermem_api::Config::from_env(&cwd);
                tokio::runtime::Runtime::new()?.block_on(evermem_mcp::serve(config))?;
                Ok(())
            }
        },
        Command::Serve { bind, port } => cmd_serve::execute(&cwd, &bind, port),
        Command::Groups { all, json } => cmd_groups::execute(&cwd, all, json),
    }
}
