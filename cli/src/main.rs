// peercall: signaling relay and account server
//
// Cross-platform (macOS, Linux, Windows) command-line interface: runs the
// server and inspects its accounts and call logs offline.

mod api;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use peercall_core::account::{AuthService, PasswordHasher, TokenIssuer, User, UserStore};
use peercall_core::registry::{LocalRegistry, RegistryConfig};
use peercall_core::{CallLogStore, SignalingRelay, SledStorage, StorageBackend};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "peercall")]
#[command(about = "peercall: call signaling relay and account server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP + WebSocket server
    Start {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect registered users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Inspect or record call logs
    Calls {
        #[command(subcommand)]
        action: CallsAction,
    },
    /// Show server status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[derive(Subcommand)]
enum UserAction {
    List,
    Show { user: String },
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },
}

#[derive(Subcommand)]
enum ContactAction {
    Add { user: String, contact: String },
    Remove { user: String, contact: String },
    List { user: String },
}

#[derive(Subcommand)]
enum CallsAction {
    List {
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    Record { caller: String, receiver: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Start { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Start { port } => cmd_start(port).await,
        Commands::Config { action } => cmd_config(action).await,
        Commands::User { action } => cmd_user(action).await,
        Commands::Calls { action } => cmd_calls(action).await,
        Commands::Status => cmd_status().await,
    }
}

fn open_backend(config: &config::Config) -> Result<Arc<dyn StorageBackend>> {
    let path = config.storage_dir()?;
    let storage = SledStorage::open(&path)
        .map_err(anyhow::Error::msg)
        .with_context(|| {
            format!(
                "Failed to open database at {} (is the server running?)",
                path.display()
            )
        })?;
    Ok(Arc::new(storage))
}

async fn cmd_start(port: Option<u16>) -> Result<()> {
    let config = config::Config::load()?;
    let port = port.unwrap_or(config.listen_port);
    let secret = config.require_jwt_secret()?;

    let addr: SocketAddr = format!("{}:{}", config.bind_address, port)
        .parse()
        .context("Invalid bind address")?;

    let backend = open_backend(&config)?;
    let upload_dir = config.uploads_dir()?;
    std::fs::create_dir_all(&upload_dir).context("Failed to create upload directory")?;

    let auth = AuthService::new(
        UserStore::new(backend.clone()),
        PasswordHasher::new(config.auth.bcrypt_cost),
        TokenIssuer::new(secret.as_bytes(), config.auth.token_ttl_secs),
    );
    let api_ctx = api::ApiContext {
        auth: Arc::new(auth),
        calls: CallLogStore::new(backend),
        upload_dir: upload_dir.clone(),
    };

    let registry = LocalRegistry::with_config(RegistryConfig {
        max_connections: config.relay.max_connections,
    });
    let relay = Arc::new(SignalingRelay::new(Arc::new(registry)));

    println!("{}", "peercall: starting...".bold());
    println!();
    println!("{} Database: {}", "✓".green(), config.storage_dir()?.display());
    println!("{} Uploads:  {}", "✓".green(), upload_dir.display());
    println!("{} Listening on {}", "✓".green(), addr.to_string().bright_cyan());
    println!("  WebSocket: {}", format!("ws://{}/ws", addr).bright_green());
    println!();

    tokio::select! {
        _ = server::run(addr, relay.clone(), api_ctx) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            println!();
            println!(
                "{} Shutting down ({} live connections)",
                "✓".green(),
                relay.registry().len()
            );
        }
    }

    Ok(())
}

async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config::Config::set(&key, &value)?;
            let shown = if key == "jwt_secret" { "(set)" } else { value.as_str() };
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), shown);
        }

        ConfigAction::Get { key } => {
            let config = config::Config::load()?;
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown or unset config key: {}", key);
            }
        }

        ConfigAction::List => {
            let config = config::Config::load()?;
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }

            println!();
            println!("Config file: {}", config::Config::config_file()?.display());
        }
    }

    Ok(())
}

async fn cmd_user(action: UserAction) -> Result<()> {
    let config = config::Config::load()?;
    let users = UserStore::new(open_backend(&config)?);

    match action {
        UserAction::List => {
            let all = users.list()?;
            if all.is_empty() {
                println!("{}", "No users registered".dimmed());
                return Ok(());
            }

            println!("{} ({})", "Users".bold(), all.len());
            println!();
            for user in all {
                println!(
                    "  {:<20} {:<30} {}",
                    user.username.bright_cyan(),
                    user.email,
                    user.id.dimmed()
                );
            }
        }

        UserAction::Show { user } => {
            let user = find_user(&users, &user)?;
            println!("{}", "User".bold());
            println!("  ID:       {}", user.id.bright_cyan());
            println!("  Username: {}", user.username);
            println!("  Email:    {}", user.email);
            println!(
                "  Picture:  {}",
                if user.profile_picture.is_empty() {
                    "(none)".dimmed().to_string()
                } else {
                    user.profile_picture.clone()
                }
            );
            println!("  Contacts: {}", user.contacts.len());
        }

        UserAction::Contact { action } => match action {
            ContactAction::Add { user, contact } => {
                let owner = find_user(&users, &user)?;
                let other = find_user(&users, &contact)?;
                users.add_contact(&owner.id, &other.id)?;
                println!(
                    "{} Added {} to {}'s contacts",
                    "✓".green(),
                    other.username.bright_cyan(),
                    owner.username
                );
            }

            ContactAction::Remove { user, contact } => {
                let owner = find_user(&users, &user)?;
                let other = find_user(&users, &contact)?;
                users.remove_contact(&owner.id, &other.id)?;
                println!("{} Removed contact", "✓".green());
            }

            ContactAction::List { user } => {
                let owner = find_user(&users, &user)?;
                let contacts = users.contacts(&owner.id)?;

                println!("{} ({})", format!("Contacts of {}", owner.username).bold(), contacts.len());
                if contacts.is_empty() {
                    println!("  {}", "(none)".dimmed());
                }
                for contact in contacts {
                    println!("  {:<20} {}", contact.username.bright_cyan(), contact.email);
                }
            }
        },
    }

    Ok(())
}

async fn cmd_calls(action: CallsAction) -> Result<()> {
    let config = config::Config::load()?;
    let backend = open_backend(&config)?;
    let users = UserStore::new(backend.clone());
    let calls = CallLogStore::new(backend);

    match action {
        CallsAction::List { user, limit } => {
            let filter = match user {
                Some(query) => Some(find_user(&users, &query)?.id),
                None => None,
            };
            let logs = calls.recent(filter.as_deref(), limit)?;

            if logs.is_empty() {
                println!("{}", "No call logs".dimmed());
                return Ok(());
            }

            println!("{}", "Call Logs".bold());
            println!();
            for log in logs {
                println!(
                    "  {} {} → {} [{}]",
                    log.formatted_time().dimmed(),
                    display_name(&users, &log.caller).bright_cyan(),
                    display_name(&users, &log.receiver).bright_cyan(),
                    log.status.yellow()
                );
            }
        }

        CallsAction::Record { caller, receiver } => {
            let caller = find_user(&users, &caller)?;
            let receiver = find_user(&users, &receiver)?;
            let log = calls.record(&caller.id, &receiver.id)?;
            println!("{} Recorded call {}", "✓".green(), log.id.bright_cyan());
        }
    }

    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = config::Config::load()?;

    println!("{}", "peercall Status".bold());
    println!();

    let probe = format!("127.0.0.1:{}", config.listen_port);
    if tokio::net::TcpStream::connect(&probe).await.is_ok() {
        println!("Server:    {} on port {}", "running".green(), config.listen_port);
        println!("{}", "  (database is locked while the server runs)".dimmed());
        return Ok(());
    }

    println!("Server:    {}", "stopped".yellow());
    let backend = open_backend(&config)?;
    println!("Users:     {}", UserStore::new(backend.clone()).count());
    println!("Call logs: {}", CallLogStore::new(backend).count());

    Ok(())
}

/// Resolve a user by id, email or username
fn find_user(users: &UserStore, query: &str) -> Result<User> {
    if let Some(user) = users.get(query)? {
        return Ok(user);
    }

    if let Some(user) = users.find_by_email(query)? {
        return Ok(user);
    }

    if let Some(user) = users.list()?.into_iter().find(|u| u.username == query) {
        return Ok(user);
    }

    anyhow::bail!("User not found: {}", query)
}

fn display_name(users: &UserStore, id: &str) -> String {
    match users.get(id) {
        Ok(Some(user)) => user.username,
        _ => format!("{} (deleted)", id),
    }
}
