//! # EduNexus CLI (`edunexus`)
//!
//! The `edunexus` binary initializes the database, seeds the default accounts,
//! runs the HTTP API and offers a few maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! edunexus --config ./config/edunexus.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `edunexus init` | Create the SQLite database and run schema migrations |
//! | `edunexus seed` | Create or reset the default admin, student and teacher accounts |
//! | `edunexus serve` | Start the HTTP API |
//! | `edunexus user add` | Create a verified account |
//! | `edunexus recommend <email>` | Print a student's ranked recommendations |
//! | `edunexus stats` | Print platform counts |
//!
//! ## Examples
//!
//! ```bash
//! edunexus init --config ./config/edunexus.toml
//! edunexus seed
//! edunexus user add --name "Ada" --email ada@example.com --password secret123 --role teacher
//! RUST_LOG=edunexus=debug edunexus serve
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edunexus::ai::create_client;
use edunexus::config::{self, Config};
use edunexus::dashboard::admin_dashboard;
use edunexus::models::Role;
use edunexus::recommend::recommend;
use edunexus::users::{create_user, find_user_by_email, seed_default_users, validate_new_user};
use edunexus::{db, migrate, server};

/// EduNexus: learning content for students, teachers and admins, with
/// AI-assisted recommendations and chat.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/edunexus.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "edunexus",
    about = "EduNexus: learning content service with AI-assisted recommendations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/edunexus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Create or reset the default accounts (password `password`).
    Seed,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Manage user accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Print the ranked recommendations for a user.
    Recommend {
        /// Email of the user.
        email: String,
    },

    /// Print user and content counts.
    Stats,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a verified account.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// One of `student`, `teacher`, `admin`.
        #[arg(long, default_value = "student")]
        role: String,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edunexus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed => run_seed(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::User {
            action:
                UserAction::Add {
                    name,
                    email,
                    password,
                    role,
                },
        } => run_user_add(&cfg, name, email, password, role).await?,
        Commands::Recommend { email } => run_recommend(&cfg, &email).await?,
        Commands::Stats => run_stats(&cfg).await?,
    }

    Ok(())
}

async fn run_seed(cfg: &Config) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::migrate_pool(&pool).await?;
    for user in seed_default_users(&pool).await? {
        println!("  {:<8} {}", user.role.as_str(), user.email);
    }
    println!("Seeded default accounts.");
    Ok(())
}

async fn run_user_add(
    cfg: &Config,
    name: String,
    email: String,
    password: String,
    role: String,
) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::migrate_pool(&pool).await?;

    // Same rules as the admin API.
    let body = serde_json::json!({
        "name": name,
        "email": email,
        "password": password,
        "role": role,
    });
    let new = match validate_new_user(&pool, body).await {
        Ok(new) => new,
        Err(e) => bail!("{}", e),
    };
    let user = create_user(&pool, &new).await?;
    println!("Created {} {} (id {}).", user.role, user.email, user.id);
    Ok(())
}

async fn run_recommend(cfg: &Config, email: &str) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    let user = find_user_by_email(&pool, email)
        .await?
        .with_context(|| format!("No user with email {}", email))?;
    let ai = create_client(&cfg.ai)?;

    let recs = recommend(&pool, ai.as_ref(), user.id).await?;
    if recs.is_empty() {
        println!("No recommendations for {}.", user.email);
        return Ok(());
    }
    for (i, rec) in recs.iter().enumerate() {
        println!(
            "{:>2}. [{:.2}] #{} {} ({}, {}, {})",
            i + 1,
            rec.score,
            rec.item.id,
            rec.item.title,
            rec.item.subject,
            rec.item.difficulty,
            rec.item.content_type
        );
        println!("      {}", rec.reason);
    }
    Ok(())
}

async fn run_stats(cfg: &Config) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    let stats = admin_dashboard(&pool).await?;

    println!("Users:    {}", stats.total_users);
    for role in Role::ALL {
        let count = stats.users_by_role.get(role.as_str()).copied().unwrap_or(0);
        println!("  {:<10} {}", role.as_str(), count);
    }
    println!("  joined in the last 7 days: {}", stats.recent_users);
    println!("Content:  {}", stats.total_content);
    for (content_type, count) in &stats.content_by_type {
        println!("  {:<12} {}", content_type, count);
    }
    println!("  added in the last 7 days: {}", stats.recent_content);
    Ok(())
}
