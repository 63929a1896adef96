mod commands;
mod config;
mod remote;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::helpers::{parse_day, parse_flag, parse_week};
use crate::commands::{
    LogFields, cmd_coach_clients, cmd_coach_show, cmd_day, cmd_export, cmd_import, cmd_log,
    cmd_login, cmd_logout, cmd_progress, cmd_promote, cmd_reset, cmd_signup, cmd_week, cmd_whoami,
};
use crate::config::Config;
use diary_core::db::Database;
use diary_core::models::Role;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";
const LOG_ENV: &str = "DIARY_LOG";

#[derive(Parser)]
#[command(
    name = "diary",
    version,
    about = "Fighter Reset: an 8-week habit and recovery diary",
    long_about = "Fighter Reset: an 8-week habit and recovery diary.\n\n\
        Works offline on this device by default. Sign in to keep the diary on a sync server \
        where your coach can follow it."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one week of the diary
    Week {
        /// Week number (1-8)
        #[arg(value_parser = parse_week)]
        week: u8,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one day in detail
    Day {
        /// Week number (1-8)
        #[arg(value_parser = parse_week)]
        week: u8,
        /// Day: mon..sun, hungarian name, or 0-6
        #[arg(value_parser = parse_day)]
        day: u8,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record values for a day
    Log {
        /// Week number (1-8)
        #[arg(value_parser = parse_week)]
        week: u8,
        /// Day: mon..sun, hungarian name, or 0-6
        #[arg(value_parser = parse_day)]
        day: u8,
        #[command(flatten)]
        fields: LogFields,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show overall progress and per-week statistics
    Progress {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the diary to a JSON file
    Export {
        /// Output file, "-" for stdout (default: fighter-reset-naplo-<date>.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the diary with an exported JSON file
    Import {
        /// Path to the exported file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear every entry of the diary
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an account on a sync server and sign in
    Signup {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Sign in to a sync server
    Login {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Sign out and go back to the device-local diary
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Browse client diaries (coach accounts only)
    Coach {
        #[command(subcommand)]
        command: CoachCommands,
    },
    /// Start the sync server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Server database path (default: server.db in the data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Change an account's role in a server database
    Promote {
        /// Account email
        email: String,
        /// Role to assign: admin or client
        #[arg(short, long, default_value = "admin")]
        role: String,
        /// Server database path (default: server.db in the data directory)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct AuthArgs {
    /// Sync server URL
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,
    /// Account email
    #[arg(short, long)]
    email: String,
    /// Account password
    #[arg(short, long)]
    password: String,
    /// Copy the diary on this device to the account when the account has none (yes/no)
    #[arg(long, value_parser = parse_flag)]
    import_local: Option<bool>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum CoachCommands {
    /// List client accounts, newest first
    Clients {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a client's diary
    Show {
        /// Client email, id, or id prefix
        client: String,
        /// Week number (1-8)
        #[arg(short, long, value_parser = parse_week)]
        week: Option<u8>,
        /// Day within the week: mon..sun, hungarian name, or 0-6
        #[arg(short, long, value_parser = parse_day)]
        day: Option<u8>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Week { week, json } => cmd_week(&config, week, json).await,
        Commands::Day { week, day, json } => cmd_day(&config, week, day, json).await,
        Commands::Log {
            week,
            day,
            fields,
            json,
        } => cmd_log(&config, week, day, fields, json).await,
        Commands::Progress { json } => cmd_progress(&config, json).await,
        Commands::Export { out, json } => cmd_export(&config, out, json).await,
        Commands::Import { file, json } => cmd_import(&config, &file, json).await,
        Commands::Reset { yes, json } => cmd_reset(&config, yes, json).await,
        Commands::Signup { auth } => {
            cmd_signup(
                &config,
                &auth.server,
                &auth.email,
                &auth.password,
                auth.import_local,
                auth.json,
            )
            .await
        }
        Commands::Login { auth } => {
            cmd_login(
                &config,
                &auth.server,
                &auth.email,
                &auth.password,
                auth.import_local,
                auth.json,
            )
            .await
        }
        Commands::Logout { json } => cmd_logout(&config, json).await,
        Commands::Whoami { json } => cmd_whoami(&config, json).await,
        Commands::Coach { command } => match command {
            CoachCommands::Clients { json } => cmd_coach_clients(&config, json).await,
            CoachCommands::Show {
                client,
                week,
                day,
                json,
            } => cmd_coach_show(&config, &client, week, day, json).await,
        },
        Commands::Serve { port, bind, db } => {
            let db = Database::open(&db.unwrap_or(config.server_db_path))?;
            server::start_server(db, port, &bind).await
        }
        Commands::Promote {
            email,
            role,
            db,
            json,
        } => {
            let role: Role = role.parse()?;
            let path = db.unwrap_or(config.server_db_path);
            cmd_promote(&path, &email, role, json)
        }
    }
}
