//! Knugget CLI - command-line client for the Knugget backend.

mod commands;
mod output;

use clap::{Parser, Subcommand};

/// Knugget command-line interface.
#[derive(Parser)]
#[command(name = "knugget")]
#[command(about = "Knugget client for authentication and session sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the
    /// configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (session, socket, config).
    /// Defaults to ~/.knugget
    #[arg(long, global = true)]
    base_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the client in the foreground: host the extension bridge and
    /// keep the session fresh
    Run,

    /// Log in with email and password
    Login {
        /// Email address (prompted when omitted)
        #[arg(long)]
        email: Option<String>,

        /// Password (prompted without echo when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and log in
    Register {
        /// Email address (prompted when omitted)
        #[arg(long)]
        email: Option<String>,

        /// Password (prompted without echo when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show the stored session
    Status,

    /// Exchange the refresh token for new session tokens
    Refresh,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let setup = match commands::ClientSetup::load(cli.base_dir.clone()) {
        Ok(setup) => setup,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| setup.config.log_level.clone());
    match cli.command {
        // Foreground mode mirrors logs to stderr.
        Commands::Run => knugget_core::init_logging(&level),
        _ => observability::init_with_config(observability::LogConfig {
            service_name: "knugget".into(),
            default_level: level,
            also_stderr: false,
            ..Default::default()
        }),
    }

    let result = match cli.command {
        Commands::Run => commands::run(setup).await,
        Commands::Login { email, password } => {
            commands::login(&setup, email.as_deref(), password.as_deref(), &cli.format).await
        }
        Commands::Register {
            email,
            password,
            name,
        } => {
            commands::register(
                &setup,
                email.as_deref(),
                password.as_deref(),
                name.as_deref(),
                &cli.format,
            )
            .await
        }
        Commands::Logout => commands::logout(&setup, &cli.format).await,
        Commands::Status => commands::status(&setup, &cli.format).await,
        Commands::Refresh => commands::refresh(&setup, &cli.format).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
