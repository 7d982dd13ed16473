use crate::config::{ConnectionConfig, Settings};
use crate::migrations::error::MigrationError;
use crate::migrations::file::{self, MigrationFile};
use crate::migrations::{Connector, SqlExecutor};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// What to do with the remaining files after one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure. Later files may depend on the failed one.
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    pub filename: String,
    pub succeeded: bool,
    pub skipped_empty: bool,
    pub error: Option<String>,
}

impl MigrationResult {
    fn applied(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            succeeded: true,
            skipped_empty: false,
            error: None,
        }
    }

    fn skipped(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            succeeded: true,
            skipped_empty: true,
            error: None,
        }
    }

    fn failed(filename: &str, error: String) -> Self {
        Self {
            filename: filename.to_string(),
            succeeded: false,
            skipped_empty: false,
            error: Some(error),
        }
    }

    pub fn to_error(&self) -> Option<MigrationError> {
        self.error
            .as_ref()
            .map(|detail| MigrationError::StatementExecution {
                filename: self.filename.clone(),
                detail: detail.clone(),
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<MigrationResult>,
    /// Files left untouched because an earlier failure aborted the run.
    pub not_attempted: Vec<String>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded).count()
    }

    pub fn skipped_empty(&self) -> usize {
        self.results.iter().filter(|r| r.skipped_empty).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.not_attempted.is_empty()
    }

    pub fn first_failure(&self) -> Option<MigrationError> {
        self.results.iter().find_map(MigrationResult::to_error)
    }
}

/// Narrows a discovered plan to part of the directory. Filtering keeps the discovered order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Drop files whose ordinal is below this one.
    pub from: Option<u64>,
    /// Keep only these files, each given by ordinal or full filename.
    pub only: Vec<String>,
}

impl Selection {
    pub fn is_all(&self) -> bool {
        self.from.is_none() && self.only.is_empty()
    }

    /// Fails with `MigrationError::Discovery` if `from` or any `only` entry names no file.
    pub fn select(
        &self,
        dir: &Path,
        files: Vec<MigrationFile>,
    ) -> anyhow::Result<Vec<MigrationFile>> {
        if let Some(from) = self.from {
            if !files.iter().any(|f| f.ordinal == from) {
                return Err(unknown_selection(dir, &format!("--from {from}")));
            }
        }
        for selector in &self.only {
            if !files.iter().any(|f| matches_selector(f, selector)) {
                return Err(unknown_selection(dir, &format!("--only {selector}")));
            }
        }

        Ok(files
            .into_iter()
            .filter(|f| self.from.map_or(true, |from| f.ordinal >= from))
            .filter(|f| {
                self.only.is_empty() || self.only.iter().any(|s| matches_selector(f, s))
            })
            .collect())
    }
}

fn matches_selector(file: &MigrationFile, selector: &str) -> bool {
    let selector = selector.trim();
    match selector.parse::<u64>() {
        Ok(ordinal) => file.ordinal == ordinal,
        Err(_) => file.filename == selector,
    }
}

fn unknown_selection(dir: &Path, selector: &str) -> anyhow::Error {
    MigrationError::Discovery {
        path: dir.to_path_buf(),
        detail: format!("{selector} matches no migration file"),
    }
    .into()
}

/// Applies one file. Empty (whitespace-only) files succeed without reaching the executor.
pub async fn apply(executor: &mut dyn SqlExecutor, file: &MigrationFile) -> MigrationResult {
    if file.is_empty() {
        tracing::info!(filename = %file.filename, "skipping empty migration");
        return MigrationResult::skipped(&file.filename);
    }

    tracing::info!(
        filename = %file.filename,
        size_bytes = file.size_bytes(),
        "applying migration"
    );

    let t0 = std::time::Instant::now();
    match executor.execute_script(&file.sql).await {
        Ok(()) => {
            tracing::info!(
                filename = %file.filename,
                elapsed_ms = t0.elapsed().as_millis(),
                "migration applied"
            );
            MigrationResult::applied(&file.filename)
        }
        Err(err) => {
            let detail = format!("{err:#}");
            tracing::error!(filename = %file.filename, error = %detail, "migration failed");
            MigrationResult::failed(&file.filename, detail)
        }
    }
}

/// Applies `files` in the given order, one at a time. Never retries.
pub async fn run(
    executor: &mut dyn SqlExecutor,
    files: &[MigrationFile],
    policy: FailurePolicy,
) -> RunSummary {
    let started_at = Utc::now();
    let mut results = Vec::with_capacity(files.len());
    let mut not_attempted = Vec::new();

    for (idx, file) in files.iter().enumerate() {
        let result = apply(executor, file).await;
        let failed = !result.succeeded;
        results.push(result);

        if failed && policy == FailurePolicy::Abort {
            not_attempted.extend(files[idx + 1..].iter().map(|f| f.filename.clone()));
            if !not_attempted.is_empty() {
                tracing::warn!(
                    remaining = not_attempted.len(),
                    "aborting run after failed migration"
                );
            }
            break;
        }
    }

    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        results,
        not_attempted,
    };

    tracing::info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        skipped_empty = summary.skipped_empty(),
        not_attempted = summary.not_attempted.len(),
        "migration run finished"
    );

    summary
}

/// Full workflow: validate configuration, discover and select, connect, run, close.
///
/// Configuration and discovery problems are reported before any connection attempt. The
/// connection is closed whether or not the run succeeded.
pub async fn migrate(
    settings: &Settings,
    connector: &dyn Connector,
    dir: &Path,
    policy: FailurePolicy,
    selection: &Selection,
) -> anyhow::Result<RunSummary> {
    let config = ConnectionConfig::from_settings(settings)?;
    let rules = settings.ordering_rules()?;
    let discovered = file::discover(dir, &rules)?;
    let discovered_len = discovered.len();
    let files = selection.select(dir, discovered)?;

    tracing::info!(
        dir = %dir.display(),
        discovered = discovered_len,
        selected = files.len(),
        ?policy,
        "discovered migrations"
    );

    let target = format!("{}:{}/{}", config.host, config.port, config.database);
    tracing::info!(%target, "connecting");
    let mut executor = connector
        .connect(&config)
        .await
        .map_err(|e| MigrationError::Connection {
            target: target.clone(),
            detail: format!("{e:#}"),
        })?;

    let summary = run(executor.as_mut(), &files, policy).await;

    if let Err(err) = executor.close().await {
        tracing::warn!(%target, error = %err, "failed to close database connection");
    }

    Ok(summary)
}
