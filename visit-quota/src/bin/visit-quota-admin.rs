//! CLI tool for managing the visit quota store
//!
//! # Usage
//!
//! ```bash
//! # Show effective role limits, using the service's configuration
//! visit-quota-admin --config config.toml limits
//!
//! # Let subscribers view 5 profiles a day, never restrict moderators
//! visit-quota-admin set-limit subscriber 5
//! visit-quota-admin set-limit moderator -1
//!
//! # Register a member
//! visit-quota-admin add-member 42 --roles subscriber,author
//!
//! # Inspect or clear a member's visits
//! visit-quota-admin visits 42
//! visit-quota-admin reset 42
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use visit_quota::host::{Member, MemberRegistry, SystemClock, UserDirectory};
use visit_quota::quota::limits::parse_limit;
use visit_quota::quota::VisitLedger;
use visit_quota::settings::{SettingsStore, SettingsUpdate};
use visit_quota::storage::SqliteHost;
use visit_quota::Config;

#[derive(Parser)]
#[command(name = "visit-quota-admin")]
#[command(about = "Manage profile visit quota settings and records", long_about = None)]
struct Cli {
    /// TOML configuration file shared with the service
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL, overrides `storage.database_url`
    #[arg(short, long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show effective role limits
    Limits,
    /// Set the daily limit of a role (-1 = unrestricted, 0 = blocked)
    SetLimit {
        role: String,
        #[arg(allow_hyphen_values = true)]
        limit: String,
    },
    /// Set the restriction message
    SetMessage { message: String },
    /// Set the redirect template ([site-url], [visitor-url])
    SetRedirect { template: String },
    /// Create or replace a member
    AddMember {
        id: u64,
        /// Comma-separated role names
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,
        #[arg(long)]
        super_admin: bool,
        #[arg(long)]
        profile_url: Option<String>,
    },
    /// Remove a member and its records
    RemoveMember { id: u64 },
    /// List members
    Members,
    /// Show today's visits of a member
    Visits { id: u64 },
    /// Clear all recorded visits of a member
    Reset { id: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visit_quota=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let database_url = cli.db.as_deref().unwrap_or(&config.storage.database_url);

    let host = Arc::new(SqliteHost::connect(database_url).await?);
    let settings = SettingsStore::new(host.clone());
    let ledger = VisitLedger::for_site(host.clone(), Arc::new(SystemClock), &config.site)?;

    match cli.command {
        Commands::Limits => {
            let limits = settings.effective_limits().await;
            println!("{:<20} {:>10}", "Role", "Limit");
            println!("{:-<31}", "");
            for (role, limit) in limits.iter() {
                let shown = if *limit < 0 {
                    "unlimited".to_string()
                } else {
                    limit.to_string()
                };
                println!("{:<20} {:>10}", role, shown);
            }
        }
        Commands::SetLimit { role, limit } => {
            let limit = parse_limit(&limit);
            let mut update = SettingsUpdate::default();
            update.limits.set(role.clone(), limit);
            settings.update(update).await?;
            println!("✓ {} limit set to {}", role, limit);
        }
        Commands::SetMessage { message } => {
            settings
                .update(SettingsUpdate {
                    message: Some(message),
                    ..Default::default()
                })
                .await?;
            println!("✓ Restriction message updated");
        }
        Commands::SetRedirect { template } => {
            settings
                .update(SettingsUpdate {
                    redirect_url: Some(template),
                    ..Default::default()
                })
                .await?;
            println!("✓ Redirect template updated");
        }
        Commands::AddMember {
            id,
            roles,
            super_admin,
            profile_url,
        } => {
            let mut member = Member::new(id)
                .with_roles(roles.into_iter().map(|r| r.trim().to_string()).filter(|r| !r.is_empty()))
                .with_super_admin(super_admin);
            member.profile_url = profile_url;

            host.upsert_member(member).await?;
            println!("✓ Member {} stored", id);
        }
        Commands::RemoveMember { id } => {
            if !host.remove_member(id).await? {
                eprintln!("Error: Member {} does not exist", id);
                std::process::exit(1);
            }
            println!("✓ Member {} removed", id);
        }
        Commands::Members => {
            let members = host.list_members().await?;
            if members.is_empty() {
                println!("No members found.");
            } else {
                println!("{:<10} {:<40} {:<6}", "Id", "Roles", "Super");
                println!("{:-<58}", "");
                for member in &members {
                    let roles = member.roles.iter().cloned().collect::<Vec<_>>().join(",");
                    println!(
                        "{:<10} {:<40} {:<6}",
                        member.id,
                        roles,
                        if member.super_admin { "yes" } else { "" }
                    );
                }
                println!("\nTotal: {} member(s)", members.len());
            }
        }
        Commands::Visits { id } => {
            let member = host.find_member(id).await?.unwrap_or_else(|| Member::new(id));
            let limits = settings.effective_limits().await;
            let status = ledger.status(&member, &limits).await;

            println!("Day: {}", status.day);
            println!(
                "Visited: {}",
                status
                    .visited
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            match status.remaining {
                Some(remaining) => println!("Remaining today: {}", remaining),
                None => println!("Remaining today: unlimited"),
            }
        }
        Commands::Reset { id } => {
            ledger.reset(id).await?;
            println!("✓ Visits of member {} cleared", id);
        }
    }

    Ok(())
}
