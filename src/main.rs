use clap::{Parser, Subcommand};

use fleet::commands;

#[derive(Parser)]
#[command(name = "fleet", version, about = "Fleet status and bulk node reconciliation")]
struct Cli {
    /// Path to config file (default: ~/.config/fleet/config.yaml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Daemon URL for client commands (overrides config)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Output format (table, json or yaml)
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet daemon (REST + GraphQL)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,
    },

    #[command(flatten)]
    Query(commands::query::QueryCommands),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            http_addr,
            log_level,
        } => commands::daemon::run(http_addr, log_level, cli.config.as_deref()),
        Commands::Query(command) => commands::query::run(
            cli.url.as_deref(),
            cli.config.as_deref(),
            &cli.format,
            &command,
        ),
    }
}
