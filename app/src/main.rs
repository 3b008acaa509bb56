use anyhow::Result;
use clap::{Parser, Subcommand};
use clubhouse_server::{config::Overrides, logging, AppConfig};
use std::path::PathBuf;

/// Clubhouse admin backend
#[derive(Parser)]
#[command(name = "clubhouse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "CLUBHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file
        #[arg(long)]
        database: Option<PathBuf>,

        /// Directory for log files
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Print a signed identity token for local testing
    IssueToken {
        /// Email the token is issued to
        email: String,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        database: None,
        log_dir: None,
    }) {
        Commands::IssueToken { email } => {
            let config = AppConfig::load(cli.config.as_deref(), &Overrides::default())?;
            println!("{}", clubhouse_server::issue_token(&config, &email)?);
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            database,
            log_dir,
        } => {
            let overrides = Overrides {
                host,
                port,
                database_path: database,
                log_dir,
            };
            let config = AppConfig::load(cli.config.as_deref(), &overrides)?;

            // Logging starts before the runtime so local time offsets resolve
            let _guard = logging::init_logging(&config.logging, cli.verbose)?;
            tracing::info!("=== Clubhouse server starting ===");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(clubhouse_server::run(config, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
                tracing::info!("Shutdown signal received");
            }));

            logging::log_shutdown();
            result
        }
    }
}
