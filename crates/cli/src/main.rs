//! Tenantshift Operator CLI
//!
//! Thin operator surface over the tenant data migration engine:
//! - start: begin or resume a copy pass (optionally as a dry-run)
//! - status: inspect the latest attempt for an organization
//! - abort: stop a non-completed attempt and clean up the target
//! - finalize: cut the organization over to the copied target

mod config;
mod startup;

use clap::{Parser, Subcommand};
use tenantshift_application::{AbortMigration, FinalizeMigration, StartMigration};
use tenantshift_domain::migrations::MigrationDirection;
use tenantshift_domain::shared_kernel::{Actor, ActorRole, MigrationId, OrgId};

#[derive(Parser)]
#[command(name = "tenantshift")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tenant data migration operator tooling", long_about = None)]
struct Cli {
    /// Operator user id recorded on attempts and audit events
    #[arg(long, global = true, default_value = "platform-operator")]
    actor: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or resume a migration copy pass
    Start {
        #[arg(long)]
        org_id: String,
        /// shared_to_dedicated or dedicated_to_shared
        #[arg(long)]
        direction: String,
        #[arg(long)]
        target_uri: Option<String>,
        #[arg(long)]
        target_db_name: Option<String>,
        /// Simulate the pass without writing to the target
        #[arg(long)]
        dry_run: bool,
        /// Fail instead of resuming an existing attempt
        #[arg(long)]
        no_resume: bool,
        /// Proceed despite an active legal hold
        #[arg(long)]
        override_legal_hold: bool,
        /// Documents per checkpointed chunk
        #[arg(long)]
        chunk_size: Option<u32>,
    },
    /// Show the latest migration attempt for an organization
    Status {
        #[arg(long)]
        org_id: String,
    },
    /// Abort a non-completed attempt and delete copied target data
    Abort {
        #[arg(long)]
        migration_id: String,
        #[arg(long)]
        org_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Flip the organization's datastore pointer after pre-copy
    Finalize {
        #[arg(long)]
        migration_id: String,
        #[arg(long)]
        org_id: String,
        /// Required; finalize refuses to run without it
        #[arg(long)]
        confirm_cutover: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = config::CliConfig::load()?;
    setup_logging(cli.debug, &cfg.log_level);

    let services = startup::build_services(&cfg).await?;
    let actor = Actor::new(cli.actor.clone(), ActorRole::Superadmin);

    match cli.command {
        Commands::Start {
            org_id,
            direction,
            target_uri,
            target_db_name,
            dry_run,
            no_resume,
            override_legal_hold,
            chunk_size,
        } => {
            let direction = MigrationDirection::from_str(&direction).ok_or_else(|| {
                format!(
                    "unknown direction '{}'; expected shared_to_dedicated or dedicated_to_shared",
                    direction
                )
            })?;
            let cmd = StartMigration {
                org_id: OrgId::new(org_id),
                direction,
                target_uri,
                target_db_name,
                dry_run,
                resume: !no_resume,
                override_legal_hold,
                chunk_size,
            };
            let attempt = services.migrations.start(cmd, &actor).await?;
            println!("{}", serde_json::to_string_pretty(&attempt)?);
        }
        Commands::Status { org_id } => {
            let attempt = services
                .migrations
                .status(&OrgId::new(org_id), &actor)
                .await?;
            println!("{}", serde_json::to_string_pretty(&attempt)?);
        }
        Commands::Abort {
            migration_id,
            org_id,
            reason,
        } => {
            let cmd = AbortMigration {
                migration_id: parse_migration_id(&migration_id)?,
                org_id: OrgId::new(org_id),
                reason,
            };
            let attempt = services.migrations.abort(cmd, &actor).await?;
            println!("{}", serde_json::to_string_pretty(&attempt)?);
        }
        Commands::Finalize {
            migration_id,
            org_id,
            confirm_cutover,
        } => {
            let cmd = FinalizeMigration {
                migration_id: parse_migration_id(&migration_id)?,
                org_id: OrgId::new(org_id),
                confirm_cutover,
            };
            let attempt = services.migrations.finalize(cmd, &actor).await?;
            println!("{}", serde_json::to_string_pretty(&attempt)?);
        }
    }

    Ok(())
}

fn parse_migration_id(raw: &str) -> Result<MigrationId, String> {
    MigrationId::from_string(raw).ok_or_else(|| format!("invalid migration id '{}'", raw))
}

/// Setup logging based on debug flag.
fn setup_logging(debug: bool, default_level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let level = if debug { "debug" } else { default_level };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
