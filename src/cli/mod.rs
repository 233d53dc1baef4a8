//! CLI module for the DealDesk command-line interface.
//!
//! Without a subcommand the binary starts the server. Subcommands:
//! - `status` - Show health and version of a running server
//! - `config check` - Validate configuration file
//! - `users list` - List accounts and their roles
//! - `users set-role <email> <role>` - Grant or revoke the admin role

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::SqliteStore;
use crate::config::Config;
use crate::db::{Profile, Role};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "dealdesk")]
#[command(author, version, about = "Loan deal desk for lenders and their admins", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "DEALDESK_CONFIG", default_value = "dealdesk.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Server URL to connect to (default: http://localhost:8080)
    #[arg(long, env = "DEALDESK_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show server status (health, version)
    Status,

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Account management commands (run against the local database)
    #[command(subcommand)]
    Users(UsersCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Users subcommands
#[derive(Subcommand, Debug)]
pub enum UsersCommands {
    /// List all accounts
    List,
    /// Change the role of an account
    SetRole {
        /// Account email
        email: String,
        /// `admin` or `user`
        role: String,
    },
}

/// Health response from /health
#[derive(Debug, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

fn create_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Status) => cmd_status(cli).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli).await,
        Some(Commands::Users(UsersCommands::List)) => cmd_users_list(cli).await,
        Some(Commands::Users(UsersCommands::SetRole { email, role })) => {
            cmd_users_set_role(cli, email, role).await
        }
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

/// Display server status
async fn cmd_status(cli: &Cli) -> Result<()> {
    let client = create_client()?;
    let base_url = cli.api_url.trim_end_matches('/');

    println!("Connecting to {}...", base_url);

    let health_url = format!("{}/health", base_url);
    let response = client
        .get(&health_url)
        .send()
        .await
        .context("Failed to connect to server. Is DealDesk running?")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Server returned error {}: {}", status, body);
    }

    let health: HealthStatus = response
        .json()
        .await
        .context("Failed to parse health response")?;

    let healthy = health.status == "ok";
    let health_icon = if healthy { "[OK]" } else { "[!!]" };

    println!();
    println!("=== DealDesk Server Status ===");
    println!();
    println!("Version:    v{}", health.version);
    println!(
        "Status:     {} {}",
        health_icon,
        if healthy { "Healthy" } else { "Unhealthy" }
    );
    println!();
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "Enabled"
    } else {
        "Disabled"
    }
}

/// Validate the configuration file and print a summary
async fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        println!("To create a custom configuration, copy dealdesk.example.toml to dealdesk.toml");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!("  Static Dir:   {}", config.server.static_dir.display());
            println!(
                "  Proxy Headers: {}",
                enabled(config.server.trust_proxy_headers)
            );
            println!();
            println!("Auth:");
            println!("  Session TTL:  {}h", config.auth.session_ttl_hours);
            println!(
                "  Admin Email:  {}",
                config.admin_email().as_deref().unwrap_or("(none)")
            );
            println!("  Secure Cookies: {}", enabled(config.auth.secure_cookies));
            println!();
            println!("Security:");
            println!("  Rate Limiting: {}", enabled(config.rate_limit.enabled));
            println!();

            let mut warnings = Vec::new();
            if config.admin_email().is_none() {
                warnings.push(
                    "No admin email set - use `dealdesk users set-role` to grant the admin role",
                );
            }
            if !config.auth.secure_cookies {
                warnings.push("Session cookies are not marked Secure - enable behind TLS");
            }
            if config.auth.session_ttl_hours <= 0 {
                warnings.push("Session TTL is not positive - every session expires immediately");
            }

            if !warnings.is_empty() {
                println!("Warnings:");
                for warning in warnings {
                    println!("  [!] {}", warning);
                }
                println!();
            }

            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {}", e);
            println!();
            println!("Please check the configuration file syntax and try again.");
            anyhow::bail!("Invalid configuration file");
        }
    }
}

async fn open_store(cli: &Cli) -> Result<(crate::DbPool, SqliteStore)> {
    let config = Config::load(&cli.config)?;
    let db = crate::db::init(&config.server.data_dir).await?;
    let store = SqliteStore::new(db.clone());
    Ok((db, store))
}

/// List all accounts
async fn cmd_users_list(cli: &Cli) -> Result<()> {
    let (db, _) = open_store(cli).await?;
    let profiles = Profile::list_with_last_sign_in(&db).await?;

    if profiles.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("{:<36}  {:<32}  {:<6}  LAST SIGN-IN", "ID", "EMAIL", "ROLE");
    println!("{}", "-".repeat(100));
    for profile in profiles {
        println!(
            "{:<36}  {:<32}  {:<6}  {}",
            profile.id,
            truncate(&profile.email, 32),
            profile.role,
            profile.last_sign_in.as_deref().unwrap_or("Never")
        );
    }
    Ok(())
}

/// Change the role of an account by email
async fn cmd_users_set_role(cli: &Cli, email: &str, role: &str) -> Result<()> {
    let role = Role::from_str(role)
        .with_context(|| format!("Unknown role '{}', expected 'admin' or 'user'", role))?;

    let (db, store) = open_store(cli).await?;
    let email = crate::validation::normalize_email(email);
    let profile = Profile::find_by_email(&db, &email)
        .await?
        .with_context(|| format!("No account with email {}", email))?;

    store.set_role(&profile.id, role).await?;
    println!("[OK] {} is now {}", email, role);
    Ok(())
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
