use clap::{Parser, Subcommand};
use pqtrader_core::config::Settings;
use pqtrader_core::migrations::{combine, file, runner};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod report;

#[derive(Debug, Parser)]
#[command(name = "pqtrader_migrator", about = "PQ Trader database migration tooling")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply every migration, in order, over one database connection.
    Apply {
        /// Migrations directory. Defaults to MIGRATIONS_DIR, then ./supabase_migrations.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Keep applying later files after one fails.
        #[arg(long)]
        continue_on_error: bool,

        /// Skip migrations whose ordinal is below this one.
        #[arg(long)]
        from: Option<u64>,

        /// Apply only this migration, by ordinal or filename; repeatable.
        #[arg(long)]
        only: Vec<String>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved apply order without touching the database.
    List {
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Write all migrations into one file for the hosted SQL editor.
    Combine {
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Defaults to <dir>/_COMBINED_MIGRATIONS.sql.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check that tables exist through the REST interface.
    Verify {
        /// Table to check; repeatable. Defaults to the platform's core tables.
        #[arg(long = "table")]
        tables: Vec<String>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        // stdout carries only the report or JSON.
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    match run(args.command, &settings).await {
        Ok(code) => Ok(code),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "migrator failed");
            Err(err)
        }
    }
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<ExitCode> {
    match command {
        Command::Apply {
            dir,
            continue_on_error,
            from,
            only,
            json,
        } => {
            let dir = resolve_dir(dir, settings);
            let policy = if continue_on_error {
                runner::FailurePolicy::Continue
            } else {
                runner::FailurePolicy::Abort
            };

            let selection = runner::Selection { from, only };

            let connector = pqtrader_core::storage::postgres::PgConnector;
            let summary = runner::migrate(settings, &connector, &dir, policy, &selection).await?;

            if json {
                println!("{}", report::render_json(&summary)?);
            } else {
                print!("{}", report::render_summary(&summary));
            }

            if let Some(failure) = summary.first_failure() {
                sentry_anyhow::capture_anyhow(&anyhow::Error::new(failure));
            }
            Ok(exit_code(summary.is_success()))
        }
        Command::List { dir } => {
            let dir = resolve_dir(dir, settings);
            let files = file::discover(&dir, &settings.ordering_rules()?)?;
            print!("{}", report::render_plan(&dir, &files));
            Ok(ExitCode::SUCCESS)
        }
        Command::Combine { dir, output } => {
            let dir = resolve_dir(dir, settings);
            let files = file::discover(&dir, &settings.ordering_rules()?)?;
            if files.is_empty() {
                tracing::warn!(dir = %dir.display(), "no migration files found");
                return Ok(ExitCode::FAILURE);
            }

            let output = output.unwrap_or_else(|| combine::default_output_path(&dir));
            combine::combine(&files, &output)?;
            print!("{}", report::render_combined(&output, &files));
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { tables, json } => {
            let verifier = pqtrader_core::verify::RestVerifier::from_settings(settings)?;
            let tables: Vec<String> = if tables.is_empty() {
                pqtrader_core::verify::DEFAULT_TABLES
                    .iter()
                    .map(|t| t.to_string())
                    .collect()
            } else {
                tables
            };

            let reports = verifier.verify_tables(&tables).await?;
            if json {
                println!("{}", report::render_json(&reports)?);
            } else {
                print!("{}", report::render_tables(&reports));
            }
            Ok(exit_code(reports.iter().all(|r| r.is_present())))
        }
    }
}

fn resolve_dir(arg: Option<PathBuf>, settings: &Settings) -> PathBuf {
    arg.unwrap_or_else(|| PathBuf::from(settings.migrations_dir()))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
