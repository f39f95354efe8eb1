use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;

mod config;
mod db;
mod error;
mod identifiers;
mod integrations;
mod migrate;
mod models;
mod modules;
mod scheduler;

use config::{APP_VERSION, APP_VERSION_DESC};
use db::{Database, Registry};
use error::{OrchestratorError, Result};
use integrations::telegram::TelegramNotifier;
use integrations::ServiceRouter;
use models::{Mode, RunOverrides, Secrets, SecretsPatch, Settings};
use modules::presets::load_presets;
use modules::ModuleKind;
use scheduler::{Scheduler, SchedulerConfig};

#[derive(Parser, Debug)]
#[command(name = "orchestrator", version, about = APP_VERSION_DESC)]
struct Cli {
    /// Path to the orchestrator SQLite database
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and record the version markers
    InitDb,
    /// Update stored credentials and endpoints
    SetSecret(SecretArgs),
    /// Manage peers and channels the modules must leave alone
    Exclusions {
        #[command(subcommand)]
        action: RegistryAction,
    },
    /// Manage channels always treated as rebalance sources
    ForcedSources {
        #[command(subcommand)]
        action: RegistryAction,
    },
    /// Import exclusion lists from the legacy scripts
    MigrateExclusions {
        #[arg(long, default_value = "brln-autofee.py")]
        autofee: PathBuf,
        #[arg(long, default_value = "lndg_AR_trigger.py")]
        ar: PathBuf,
    },
    /// Print version, secrets (masked) and settings
    ShowConfig,
    /// Print recent telemetry records, newest first
    Logs {
        #[arg(long)]
        component: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run the modules
    Run(RunArgs),
}

#[derive(Subcommand, Debug)]
enum RegistryAction {
    Add {
        identifier: String,
        #[arg(long)]
        note: Option<String>,
    },
    Rm {
        identifier: String,
    },
    List,
}

#[derive(Args, Debug)]
struct SecretArgs {
    #[arg(long)]
    amboss_token: Option<String>,
    #[arg(long)]
    telegram_token: Option<String>,
    #[arg(long)]
    telegram_chat: Option<String>,
    #[arg(long)]
    lndg_url: Option<String>,
    #[arg(long)]
    lndg_user: Option<String>,
    #[arg(long)]
    lndg_pass: Option<String>,
    #[arg(long)]
    lndg_db_path: Option<String>,
    #[arg(long)]
    bos_path: Option<String>,
    #[arg(long)]
    lncli_path: Option<String>,
    /// host:port of the LND REST listener
    #[arg(long)]
    lnd_rest_host: Option<String>,
    #[arg(long)]
    macaroon_path: Option<String>,
    #[arg(long)]
    tls_cert_path: Option<String>,
    /// Set fees through LND REST instead of bos
    #[arg(long, conflicts_with = "no_lnd_rest")]
    use_lnd_rest: bool,
    #[arg(long)]
    no_lnd_rest: bool,
}

impl SecretArgs {
    fn into_patch(self) -> SecretsPatch {
        SecretsPatch {
            amboss_token: self.amboss_token,
            telegram_token: self.telegram_token,
            telegram_chat: self.telegram_chat,
            lndg_url: self.lndg_url,
            lndg_user: self.lndg_user,
            lndg_pass: self.lndg_pass,
            lndg_db_path: self.lndg_db_path,
            bos_path: self.bos_path,
            lncli_path: self.lncli_path,
            lnd_rest_host: self.lnd_rest_host,
            macaroon_path: self.macaroon_path,
            tls_cert_path: self.tls_cert_path,
            use_lnd_rest: toggle(self.use_lnd_rest, self.no_lnd_rest),
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// conservative | moderate | aggressive (legacy names accepted)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<Mode>,
    #[arg(long)]
    monthly_profit_ppm: Option<i64>,
    #[arg(long)]
    monthly_profit_sat: Option<i64>,
    #[arg(long)]
    loop_interval_autofee: Option<u64>,
    #[arg(long)]
    loop_interval_ar: Option<u64>,
    #[arg(long)]
    loop_interval_tuner: Option<u64>,
    #[arg(long, conflicts_with = "no_dry_run_autofee")]
    dry_run_autofee: bool,
    #[arg(long)]
    no_dry_run_autofee: bool,
    #[arg(long, conflicts_with = "no_dry_run_ar")]
    dry_run_ar: bool,
    #[arg(long)]
    no_dry_run_ar: bool,
    #[arg(long, conflicts_with = "no_dry_run_tuner")]
    dry_run_tuner: bool,
    #[arg(long)]
    no_dry_run_tuner: bool,
    #[arg(long)]
    didactic_explain: bool,
    #[arg(long)]
    didactic_detailed: bool,
    #[arg(long)]
    no_autofee: bool,
    #[arg(long)]
    no_ar: bool,
    #[arg(long)]
    no_tuner: bool,
    /// Run every enabled module once and exit
    #[arg(long)]
    once: bool,
}

impl RunArgs {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            mode: self.mode,
            monthly_profit_goal_ppm: self.monthly_profit_ppm,
            monthly_profit_goal_sat: self.monthly_profit_sat,
            loop_interval_autofee: self.loop_interval_autofee,
            loop_interval_ar: self.loop_interval_ar,
            loop_interval_tuner: self.loop_interval_tuner,
            dry_run_autofee: toggle(self.dry_run_autofee, self.no_dry_run_autofee),
            dry_run_ar: toggle(self.dry_run_ar, self.no_dry_run_ar),
            dry_run_tuner: toggle(self.dry_run_tuner, self.no_dry_run_tuner),
            didactic_explain: self.didactic_explain,
            didactic_detailed: self.didactic_detailed,
        }
    }

    fn enabled(&self) -> Vec<ModuleKind> {
        ModuleKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                ModuleKind::Autofee => !self.no_autofee,
                ModuleKind::Ar => !self.no_ar,
                ModuleKind::Tuner => !self.no_tuner,
            })
            .collect()
    }
}

fn parse_mode(value: &str) -> std::result::Result<Mode, String> {
    Mode::from_str(value).map_err(|_| format!("unknown mode '{}'", value))
}

/// `--x` / `--no-x` pair to "set", "unset" or "keep stored"
fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn open_db(path: Option<&str>) -> Result<(Arc<Database>, PathBuf)> {
    let path = config::resolve_db_path(path);
    let db = Database::open(&path.to_string_lossy())?;
    Ok((Arc::new(db), path))
}

fn handle_registry(db: &Database, registry: Registry, action: RegistryAction) -> Result<()> {
    match action {
        RegistryAction::Add { identifier, note } => {
            if !db.registry_add(registry, &identifier, note.as_deref())? {
                return Err(OrchestratorError::config("identifier is empty after normalization"));
            }
            let normalized = identifiers::normalize(&identifier);
            println!("[ok] {} recorded: {}", registry.label(), normalized);
            if identifiers::classify(&normalized).is_none() {
                println!("[warn] {} is neither a pubkey nor a channel id; modules will ignore it", normalized);
            }
        }
        RegistryAction::Rm { identifier } => {
            if db.registry_remove(registry, &identifier)? {
                println!("[ok] {} removed: {}", registry.label(), identifier.trim());
            } else {
                println!("[ok] {} not present: {}", registry.label(), identifier.trim());
            }
        }
        RegistryAction::List => {
            let entries = db.registry_list(registry)?;
            if entries.is_empty() {
                println!("(empty)");
            }
            for (identifier, note) in entries {
                match note.filter(|n| !n.is_empty()) {
                    Some(note) => println!("{} - {}", identifier, note),
                    None => println!("{}", identifier),
                }
            }
        }
    }
    Ok(())
}

fn handle_show_config(db: &Database) -> Result<()> {
    db.ensure_version()?;
    let secrets = db.get_secrets()?;
    let settings = db.load_settings()?;

    println!(
        "Version: {} ({})",
        db.get_meta("app_version", APP_VERSION)?,
        db.get_meta("app_version_desc", "")?
    );
    println!("\nSecrets:");
    for (key, value) in secrets.display_rows() {
        println!("  {}: {}", key, value);
    }
    println!("\nSettings:");
    if let serde_json::Value::Object(map) = serde_json::to_value(&settings).unwrap_or_default() {
        for (key, value) in map {
            println!("  {}: {}", key, value);
        }
    }
    println!(
        "\nExclusions: {}  Forced sources: {}",
        db.registry_list(Registry::Exclusions)?.len(),
        db.registry_list(Registry::ForcedSources)?.len()
    );
    Ok(())
}

fn handle_logs(db: &Database, component: Option<&str>, limit: usize) -> Result<()> {
    let records = db.recent_telemetry(limit, component)?;
    if records.is_empty() {
        println!("(empty)");
    }
    for record in records {
        println!("{}", record.render());
    }
    Ok(())
}

/// The ar module needs the dashboard: live runs refuse to start without it,
/// dry runs just drop the module.
fn check_enabled(mut enabled: Vec<ModuleKind>, secrets: &Secrets, settings: &Settings) -> Result<Vec<ModuleKind>> {
    if enabled.contains(&ModuleKind::Ar) && secrets.lndg_url().is_none() {
        if !settings.dry_run_ar {
            return Err(OrchestratorError::config(
                "LNDg URL not configured. Use set-secret --lndg-url ... or run with --no-ar",
            ));
        }
        warn!("[run] lndg_url not configured, ar module disabled");
        enabled.retain(|kind| *kind != ModuleKind::Ar);
    }
    Ok(enabled)
}

async fn handle_run(db: Arc<Database>, args: RunArgs) -> Result<()> {
    db.ensure_version()?;
    let settings = db.load_settings()?.apply_overrides(&args.overrides());
    db.save_settings(&settings)?;

    let secrets = db.get_secrets()?;
    let enabled = check_enabled(args.enabled(), &secrets, &settings)?;

    load_presets(&config::config_dir());

    let router = ServiceRouter::build(&db, &secrets);
    if let Some(reason) = router.fallback_reason() {
        eprintln!("[warn] LND REST unavailable, using CLI fee transport: {}", reason);
    }
    let notifier = Arc::new(TelegramNotifier::new(
        secrets.telegram_token.as_deref(),
        secrets.telegram_chat.as_deref(),
    ));
    info!(
        "[run] Fee transport: {}, Telegram notifications {}",
        router.transport().name(),
        if notifier.enabled() { "enabled" } else { "disabled" }
    );
    let scheduler = Scheduler::new(db, router, notifier, settings, &enabled, SchedulerConfig::default());

    if args.once {
        let outcomes = scheduler.run_once().await;
        let failed = outcomes.iter().filter(|o| !o.success).count();
        info!("[run] Single pass finished: {} modules, {} failed", outcomes.len(), failed);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[run] Ctrl-C received, stopping after the current tick");
            let _ = shutdown_tx.send(());
        }
    });
    scheduler.start(shutdown_rx).await;
    println!("Stopped by user.");
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let db_flag = cli.db.as_deref();
    match cli.command {
        Command::InitDb => {
            let (db, path) = open_db(db_flag)?;
            db.ensure_version()?;
            println!("[ok] database initialized at {}", path.display());
        }
        Command::SetSecret(args) => {
            let (db, _) = open_db(db_flag)?;
            if db.update_secrets(&args.into_patch())? {
                println!("[ok] secrets updated");
            } else {
                println!("Nothing to update.");
            }
        }
        Command::Exclusions { action } => {
            let (db, _) = open_db(db_flag)?;
            handle_registry(&db, Registry::Exclusions, action)?;
        }
        Command::ForcedSources { action } => {
            let (db, _) = open_db(db_flag)?;
            handle_registry(&db, Registry::ForcedSources, action)?;
        }
        Command::MigrateExclusions { autofee, ar } => {
            let (db, path) = open_db(db_flag)?;
            let lists = migrate::load_legacy_lists(&autofee, &ar)?;
            let counts = migrate::migrate(&db, &lists)?;
            println!("[ok] {} pubkey exclusions migrated", counts.pubkeys);
            println!("[ok] {} channel id exclusions migrated", counts.channel_ids);
            println!("[ok] {} forced source channels migrated", counts.forced_sources);
            println!("[ok] database updated at {}", path.display());
        }
        Command::ShowConfig => {
            let (db, _) = open_db(db_flag)?;
            handle_show_config(&db)?;
        }
        Command::Logs { component, limit } => {
            let (db, _) = open_db(db_flag)?;
            handle_logs(&db, component.as_deref(), limit)?;
        }
        Command::Run(args) => {
            let (db, path) = open_db(db_flag)?;
            info!("[run] Using database {}", path.display());
            handle_run(db, args).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ OrchestratorError::Configuration(_)) => {
            eprintln!("[error] {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("[error] {}", e);
            ExitCode::FAILURE
        }
    }
}
