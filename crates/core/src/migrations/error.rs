use std::fmt;
use std::path::PathBuf;

/// Failure kinds of a migration run. Carried inside `anyhow::Error` so callers can
/// `downcast_ref` to decide how to report.
#[derive(Debug, Clone)]
pub enum MigrationError {
    /// Required settings are absent. Raised before any network attempt.
    Configuration { missing: Vec<&'static str> },
    /// The migrations directory or one of its files could not be read.
    Discovery { path: PathBuf, detail: String },
    /// The database could not be reached. Fatal for the whole run.
    Connection { target: String, detail: String },
    /// A single file's SQL failed. Scoped to that file.
    StatementExecution { filename: String, detail: String },
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { missing } => {
                write!(f, "missing configuration: {}", missing.join(", "))
            }
            Self::Discovery { path, detail } => {
                write!(f, "migration discovery failed ({}): {detail}", path.display())
            }
            Self::Connection { target, detail } => {
                write!(f, "database connection to {target} failed: {detail}")
            }
            Self::StatementExecution { filename, detail } => {
                write!(f, "migration {filename} failed: {detail}")
            }
        }
    }
}

impl std::error::Error for MigrationError {}
