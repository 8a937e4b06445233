//! sessiond - Client-side authentication session coordinator service.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sessiond_core::{init_logging, Config, Paths};

/// sessiond command-line interface.
#[derive(Parser)]
#[command(name = "sessiond")]
#[command(about = "Session coordinator for provider-backed authentication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for runtime files (storage, logs, config). Defaults to ~/.sessiond
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator until interrupted
    Run,
    /// Print the current session status (local read, no network)
    Status,
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and clear the stored credential
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    match cli.command {
        Some(Commands::Run) | None => {
            app::run(config, paths).await?;
        }
        Some(Commands::Status) => {
            app::status(config, paths)?;
        }
        Some(Commands::Login { email, password }) => {
            app::login(config, paths, &email, &password).await?;
        }
        Some(Commands::Logout) => {
            app::logout(config, paths).await?;
        }
    }

    Ok(())
}
