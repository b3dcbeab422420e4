use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;

use prodman_ops::config;
use prodman_ops::db::{self, DbPool};
use prodman_ops::logging;
use prodman_ops::services::access::{
    AccessReport, AccessService, SeaOrmDirectoryStore, UserSummary,
};
use prodman_ops::services::integrity::{
    CleanupOutcome, IntegrityReport, IntegrityService, SeaOrmWorkOrderStore,
};
use prodman_ops::services::roles::{ReassignmentPlan, RoleService};
use prodman_ops::services::seed::SeedService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Integrity(command) => {
            handle_integrity_command(&context, command, cli.json).await?
        }
        Commands::Access(command) => handle_access_command(&context, command, cli.json).await?,
        Commands::Users(command) => handle_users_command(&context, command, cli.json).await?,
        Commands::Roles(command) => handle_roles_command(&context, command, cli.json).await?,
        Commands::Clients(command) => handle_clients_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "prodman-ops",
    about = "Maintenance CLI for the production-manager database",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work-order referential integrity checks
    #[command(subcommand)]
    Integrity(IntegrityCommands),
    /// Permission and role reporting
    #[command(subcommand)]
    Access(AccessCommands),
    /// User directory
    #[command(subcommand)]
    Users(UsersCommands),
    /// Role assignment maintenance
    #[command(subcommand)]
    Roles(RolesCommands),
    /// Demo data
    #[command(subcommand)]
    Clients(ClientsCommands),
}

#[derive(Subcommand)]
enum IntegrityCommands {
    /// Classify every work order as valid, unassigned or orphaned
    Scan,
    /// Delete orphaned work orders
    Cleanup(CleanupArgs),
}

#[derive(Args)]
struct CleanupArgs {
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Proceed even when no projects exist, which deletes every work order"
    )]
    allow_missing_projects: bool,
}

#[derive(Subcommand)]
enum AccessCommands {
    /// Grouped report: permissions per role, roles per user
    Report,
}

#[derive(Subcommand)]
enum UsersCommands {
    /// List users with their roles
    List,
}

#[derive(Subcommand)]
enum RolesCommands {
    /// Move every assignment of one role to another
    Reassign(ReassignArgs),
}

#[derive(Args)]
struct ReassignArgs {
    #[arg(long, help = "Role name to move assignments from")]
    from: String,
    #[arg(long, help = "Role name to move assignments to")]
    to: String,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Execute the plan instead of printing it"
    )]
    apply: bool,
}

#[derive(Subcommand)]
enum ClientsCommands {
    /// Insert the demo client table (existing clients are skipped)
    Seed,
}

struct CliContext {
    db: Arc<DbPool>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load configuration")?;
        logging::init_tracing(&config);

        let pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        db::check_connection(&pool)
            .await
            .context("database connection check failed")?;

        Ok(Self { db: Arc::new(pool) })
    }

    fn integrity_service(&self) -> IntegrityService {
        IntegrityService::new(Arc::new(SeaOrmWorkOrderStore::new(self.db.clone())))
    }

    fn access_service(&self) -> AccessService {
        AccessService::new(Arc::new(SeaOrmDirectoryStore::new(self.db.clone())))
    }

    fn role_service(&self) -> RoleService {
        RoleService::new(Arc::new(SeaOrmDirectoryStore::new(self.db.clone())))
    }

    fn seed_service(&self) -> SeedService {
        SeedService::new(self.db.clone())
    }
}

async fn handle_integrity_command(
    context: &CliContext,
    command: IntegrityCommands,
    json: bool,
) -> Result<()> {
    let service = context.integrity_service();

    match command {
        IntegrityCommands::Scan => {
            let report = service.scan().await?;
            if json {
                print_json(&report)?;
            } else {
                print_scan_report(&report);
            }
        }
        IntegrityCommands::Cleanup(args) => {
            if !service.has_projects().await? && !args.allow_missing_projects {
                bail!(
                    "no projects exist; a cleanup now would delete every work order \
                     (pass --allow-missing-projects to proceed)"
                );
            }

            let outcome = service.cleanup().await?;
            if json {
                print_json(&outcome)?;
            } else {
                print_cleanup_outcome(&outcome);
            }
        }
    }

    Ok(())
}

async fn handle_access_command(
    context: &CliContext,
    command: AccessCommands,
    json: bool,
) -> Result<()> {
    match command {
        AccessCommands::Report => {
            let report = context.access_service().permission_report().await?;
            if json {
                print_json(&report)?;
            } else {
                print_access_report(&report);
            }
        }
    }

    Ok(())
}

async fn handle_users_command(
    context: &CliContext,
    command: UsersCommands,
    json: bool,
) -> Result<()> {
    match command {
        UsersCommands::List => {
            let users = context.access_service().list_users().await?;
            if json {
                print_json(&users)?;
            } else {
                print_user_list(&users);
            }
        }
    }

    Ok(())
}

async fn handle_roles_command(
    context: &CliContext,
    command: RolesCommands,
    json: bool,
) -> Result<()> {
    match command {
        RolesCommands::Reassign(args) => {
            let service = context.role_service();
            let plan = service.plan(&args.from, &args.to).await?;

            if json {
                print_json(&plan)?;
            } else {
                print_reassignment_plan(&plan);
            }

            if args.apply {
                let applied = service.apply(&plan).await?;
                if !json {
                    println!("Applied {} move(s).", applied);
                }
            } else if !json {
                println!("Dry run; pass --apply to execute.");
            }
        }
    }

    Ok(())
}

async fn handle_clients_command(
    context: &CliContext,
    command: ClientsCommands,
    json: bool,
) -> Result<()> {
    match command {
        ClientsCommands::Seed => {
            let summary = context.seed_service().seed_clients().await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Clients seeded: {} created, {} already present",
                    summary.created, summary.skipped
                );
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_scan_report(report: &IntegrityReport) {
    println!("Work orders scanned: {}", report.total());
    println!("  valid:      {}", report.valid.len());
    println!("  unassigned: {}", report.unassigned.len());
    println!("  orphaned:   {}", report.orphaned.len());

    for order in &report.orphaned {
        if let Some(project_id) = order.project_id {
            println!(
                "    #{} {} -> missing project {}",
                order.id, order.reference, project_id
            );
        }
    }

    if report.is_clean() {
        println!("No orphaned work orders found.");
    }
}

fn print_cleanup_outcome(outcome: &CleanupOutcome) {
    println!("Deleted {} work order(s).", outcome.deleted);
    for order in &outcome.removed {
        println!("  #{} {}", order.id, order.reference);
    }
}

fn print_access_report(report: &AccessReport) {
    println!("Roles:");
    for role in &report.roles {
        let marker = if role.super_admin { " [super-admin]" } else { "" };
        if role.permissions.is_empty() {
            println!("  {}{}: (no permissions)", role.role, marker);
        } else {
            println!("  {}{}: {}", role.role, marker, role.permissions.join(", "));
        }
    }

    println!("Users:");
    for user in &report.users {
        println!("  {} ({})", user.email, user.display_name);
        for assignment in &user.roles {
            let marker = if assignment.super_admin {
                " [super-admin]"
            } else {
                ""
            };
            println!("    {}{}", assignment.role, marker);
        }
    }
}

fn print_user_list(users: &[UserSummary]) {
    println!("{} user(s)", users.len());
    for user in users {
        let state = if user.is_active { "active" } else { "inactive" };
        let roles = if user.roles.is_empty() {
            "(no roles)".to_string()
        } else {
            user.roles.join(", ")
        };
        println!(
            "  #{} {} ({}) [{}] roles: {}",
            user.id, user.email, user.display_name, state, roles
        );
    }
}

fn print_reassignment_plan(plan: &ReassignmentPlan) {
    println!(
        "Reassignment {} -> {}: {} move(s)",
        plan.from_role,
        plan.to_role,
        plan.moves.len()
    );
    for planned in &plan.moves {
        println!("  #{} {}", planned.user_id, planned.email);
    }
    if !plan.already_assigned.is_empty() {
        println!(
            "Skipped {} user(s) already holding '{}':",
            plan.already_assigned.len(),
            plan.to_role
        );
        for planned in &plan.already_assigned {
            println!("  #{} {}", planned.user_id, planned.email);
        }
    }
}
