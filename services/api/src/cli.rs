use crate::demo::{run_demo, DemoArgs};
use crate::infra::parse_status;
use crate::server;
use clap::{Args, Parser, Subcommand};
use scheme_intake::config::AppConfig;
use scheme_intake::error::AppError;
use scheme_intake::intake::{
    ApplicationId, ApplicationStatus, ApplicationStore, IntakeError, RepositoryError,
};
use scheme_intake::storage::seed::{seed_profiles_from_path, seed_schemes_from_path};
use scheme_intake::storage::{SqliteApplicationStore, SqliteProfileStore, SqliteSchemeCatalog};
use scheme_intake::telemetry;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Scheme Intake",
    about = "Discover welfare schemes and assemble applications from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Load scheme and profile CSV exports into the configured databases
    Seed(SeedArgs),
    /// Print the public status of a submitted application
    Status {
        /// Application id returned at submission
        application_id: String,
    },
    /// Move a submitted application to a new review status
    SetStatus {
        application_id: String,
        /// One of: submitted, under_review, approved, rejected
        #[arg(value_parser = parse_status)]
        status: ApplicationStatus,
    },
    /// Walk through discovery, drafting and submission against sample data
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct SeedArgs {
    /// Scheme catalog CSV
    #[arg(long)]
    pub(crate) schemes: Option<PathBuf>,
    /// Citizen profile CSV
    #[arg(long)]
    pub(crate) profiles: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Seed(args) => run_seed(args),
        Command::Status { application_id } => run_status(application_id),
        Command::SetStatus {
            application_id,
            status,
        } => run_set_status(application_id, status),
        Command::Demo(args) => run_demo(args),
    }
}

fn run_seed(args: SeedArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    if args.schemes.is_none() && args.profiles.is_none() {
        println!("Nothing to seed: pass --schemes and/or --profiles");
        return Ok(());
    }

    if let Some(path) = args.schemes {
        let catalog = SqliteSchemeCatalog::open(&config.storage.schemes_db)?;
        let report = seed_schemes_from_path(&catalog, &path)?;
        println!(
            "Schemes from {}: {} inserted, {} already present",
            path.display(),
            report.inserted,
            report.skipped
        );
    }

    if let Some(path) = args.profiles {
        let profiles = SqliteProfileStore::open(&config.storage.profiles_db)?;
        let report = seed_profiles_from_path(&profiles, &path)?;
        println!(
            "Profiles from {}: {} upserted, {} skipped",
            path.display(),
            report.inserted,
            report.skipped
        );
    }

    Ok(())
}

fn run_status(application_id: String) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = SqliteApplicationStore::open(&config.storage.applications_db)?;
    let view = store
        .status(&ApplicationId(application_id.clone()))
        .map_err(|err| not_found_or(err, application_id))?;

    println!("Application {}", view.application_id);
    println!("- Scheme: {}", view.scheme_name);
    println!("- Status: {}", view.status);
    Ok(())
}

fn run_set_status(application_id: String, status: ApplicationStatus) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let store = SqliteApplicationStore::open(&config.storage.applications_db)?;
    let view = store
        .set_status(&ApplicationId(application_id.clone()), status)
        .map_err(|err| not_found_or(err, application_id))?;

    println!(
        "Application {} ({}) is now {}",
        view.application_id, view.scheme_name, view.status
    );
    Ok(())
}

fn not_found_or(err: RepositoryError, application_id: String) -> AppError {
    match err {
        RepositoryError::NotFound => IntakeError::ApplicationNotFound(application_id).into(),
        other => IntakeError::Repository(other).into(),
    }
}
