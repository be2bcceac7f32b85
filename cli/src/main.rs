use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use schema_tick_core::SchemaConfig;
use schema_tick_sqlite::{DataVersionManager, Database, DatabaseSnapshot, PendingPlans};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "schema-tick")]
#[command(about = "Inspect and upgrade versioned SQLite schemas", version)]
struct Cli {
    /// Log engine decisions to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the mode, registered plans and observed baselines.
    Status(SchemaArgs),
    /// List the plans the next upgrade would run, without running them.
    Plan(PlanArgs),
    /// Run every pending plan.
    Upgrade(SchemaArgs),
    /// Run the downgrade hooks of one version's plans.
    Downgrade(DowngradeArgs),
    /// List the tables in a database with their columns.
    Tables(TablesArgs),
}

#[derive(Debug, Args)]
struct SchemaArgs {
    /// Schema YAML file.
    #[arg(long)]
    config: PathBuf,
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct DowngradeArgs {
    #[command(flatten)]
    schema: SchemaArgs,
    /// Version whose plans are downgraded.
    #[arg(long = "to")]
    version: String,
}

#[derive(Debug, Args)]
struct TablesArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Status(args) => run_status(args),
        Command::Plan(args) => run_plan(args),
        Command::Upgrade(args) => run_upgrade(args),
        Command::Downgrade(args) => run_downgrade(args),
        Command::Tables(args) => run_tables(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn open_manager(args: &SchemaArgs) -> Result<DataVersionManager, String> {
    tracing::debug!(config = %args.config.display(), db = %args.db.display(), "opening schema");
    let config = SchemaConfig::load(&args.config)
        .map_err(|e| format!("Failed to load schema config '{}': {e}", args.config.display()))?;
    let conn = Database::open(&args.db).map_err(|e| e.to_string())?;
    DataVersionManager::from_config(conn, &config)
        .map_err(|e| format!("Failed to register plans: {e}"))
}

fn print_pending(pending: &PendingPlans) {
    if pending.baselines.is_empty() {
        println!("  Baseline: none (empty database)");
    }
    for baseline in &pending.baselines {
        match &baseline.chain {
            Some(entity) => println!("  Baseline {entity}: {}", baseline.version),
            None => println!("  Baseline: {}", baseline.version),
        }
    }
    if pending.is_empty() {
        println!("  Up to date.");
    }
    for key in &pending.pending {
        println!("  pending {key}");
    }
}

// ---------------------------------------------------------------------------
// commands
// ---------------------------------------------------------------------------

fn run_status(args: SchemaArgs) -> Result<(), String> {
    let manager = open_manager(&args)?;
    let pending = manager
        .pending_plans()
        .map_err(|e| format!("Failed to resolve pending plans: {e}"))?;
    println!("Schema Status:");
    println!("  Database: {}", args.db.display());
    println!("  Mode: {:?}", manager.mode());
    println!("  Strategy: {}", manager.strategy().name());
    println!("  Versions: {}", manager.catalog().chain().len());
    println!("  Registered plans: {}", manager.plan_count());
    println!("  Pending plans: {}", pending.pending.len());
    print_pending(&pending);
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<(), String> {
    let manager = open_manager(&args.schema)?;
    let pending = manager
        .pending_plans()
        .map_err(|e| format!("Failed to resolve pending plans: {e}"))?;
    if args.json {
        let json = serde_json::to_string_pretty(&pending).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        println!("Upgrade plan:");
        print_pending(&pending);
    }
    Ok(())
}

fn run_upgrade(args: SchemaArgs) -> Result<(), String> {
    let mut manager = open_manager(&args)?;
    let report = manager
        .upgrade_to_target_version()
        .map_err(|e| format!("Upgrade failed: {e}"))?;
    if report.executed.is_empty() {
        println!("Already up to date.");
        return Ok(());
    }
    println!("Upgrade complete:");
    for key in &report.executed {
        println!("  ran {key}");
    }
    println!("  Modifications: {}", report.modified);
    Ok(())
}

fn run_downgrade(args: DowngradeArgs) -> Result<(), String> {
    let mut manager = open_manager(&args.schema)?;
    let version = manager
        .catalog()
        .version(&args.version)
        .map_err(|e| e.to_string())?
        .clone();
    let modified = manager
        .downgrade(&version)
        .map_err(|e| format!("Downgrade failed: {e}"))?;
    println!("Downgrade of {version} complete. Modifications: {modified}");
    Ok(())
}

fn run_tables(args: TablesArgs) -> Result<(), String> {
    if !args.db.exists() {
        return Err(format!("Database '{}' does not exist", args.db.display()));
    }
    let conn = Database::open(&args.db).map_err(|e| e.to_string())?;
    let snapshot = DatabaseSnapshot::capture(&conn).map_err(|e| format!("Failed to read tables: {e}"))?;
    for name in snapshot.table_names() {
        let columns = snapshot.columns(name).unwrap_or_default();
        println!("{name} ({})", columns.join(", "));
    }
    Ok(())
}
