pub mod combine;
pub mod error;
pub mod file;
pub mod runner;

use crate::config::ConnectionConfig;

/// A live database session that can run one migration's SQL as a unit.
#[async_trait::async_trait]
pub trait SqlExecutor: Send {
    /// Executes the whole script, committing on success. On error nothing from the script is
    /// kept and the returned message is the database's own.
    async fn execute_script(&mut self, sql: &str) -> anyhow::Result<()>;

    /// Releases the session. Called once at the end of a run, whatever its outcome.
    async fn close(&mut self) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<Box<dyn SqlExecutor>>;
}
