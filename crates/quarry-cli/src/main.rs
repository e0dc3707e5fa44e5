use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "quarry", version, about = "MCP tool server for SQLite and libSQL databases")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the MCP server (stdio by default).
    Serve(commands::serve::ServeArgs),

    /// Inspect the tool catalog without connecting to a database.
    Tools {
        #[command(subcommand)]
        cmd: ToolsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// List every tool with its behaviour hints.
    List {
        /// Print each tool's input schema.
        #[arg(long, short, default_value_t = false)]
        verbose: bool,
    },

    /// Show the input schema and annotations of one tool.
    Describe { tool_name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the stdio transport, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve(args) => commands::serve::run(args).await?,

        Command::Tools { cmd } => match cmd {
            ToolsCommand::List { verbose } => commands::tools::list(verbose)?,
            ToolsCommand::Describe { tool_name } => commands::tools::describe(&tool_name)?,
        },
    }

    Ok(())
}
