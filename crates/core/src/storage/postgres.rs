use crate::config::ConnectionConfig;
use crate::migrations::{Connector, SqlExecutor};
use anyhow::Context;
use sqlx::postgres::{PgConnectOptions, PgDatabaseError, PgErrorPosition};
use sqlx::{Connection, Executor, PgConnection};

const APPLICATION_NAME: &str = "pqtrader_migrator";

/// Opens a single `PgConnection` per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait::async_trait]
impl Connector for PgConnector {
    async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<Box<dyn SqlExecutor>> {
        let conn = PgConnection::connect_with(&connect_options(config))
            .await
            .context("postgres connect failed")?;
        Ok(Box::new(PgExecutor { conn: Some(conn) }))
    }
}

fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    // The Supabase pooler runs pgbouncer in transaction mode, which cannot hold server-side
    // prepared statements.
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password)
        .ssl_mode(config.ssl_mode)
        .application_name(APPLICATION_NAME)
        .statement_cache_capacity(0)
}

#[derive(Debug)]
pub struct PgExecutor {
    conn: Option<PgConnection>,
}

#[async_trait::async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute_script(&mut self, sql: &str) -> anyhow::Result<()> {
        let conn = self
            .conn
            .as_mut()
            .context("database connection already closed")?;

        // One transaction per file. Dropping `tx` on error rolls it back. A bare `&str` has no
        // bind arguments, so it goes over the simple query protocol and may hold many statements.
        let mut tx = conn.begin().await.context("begin transaction failed")?;
        (&mut *tx)
            .execute(sql)
            .await
            .map_err(|e| describe_error(e, sql))?;
        tx.commit().await.context("commit transaction failed")?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.context("postgres close failed")?;
        }
        Ok(())
    }
}

/// Folds the server's detail and hint, plus the failing script line, into the error.
fn describe_error(err: sqlx::Error, sql: &str) -> anyhow::Error {
    let Some(pg) = err
        .as_database_error()
        .and_then(|e| e.try_downcast_ref::<PgDatabaseError>())
    else {
        return err.into();
    };

    let mut msg = format!("{} (SQLSTATE {})", pg.message(), pg.code());
    if let Some(PgErrorPosition::Original(pos)) = pg.position() {
        msg.push_str(&format!(" at line {}", line_of_position(sql, pos)));
    }
    if let Some(detail) = pg.detail() {
        msg.push_str(&format!("; detail: {detail}"));
    }
    if let Some(hint) = pg.hint() {
        msg.push_str(&format!("; hint: {hint}"));
    }
    anyhow::anyhow!(msg)
}

/// Postgres reports error positions as 1-based character offsets into the submitted text.
fn line_of_position(sql: &str, position: usize) -> usize {
    sql.chars()
        .take(position.saturating_sub(1))
        .filter(|c| *c == '\n')
        .count()
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_position_to_line() {
        let sql = "CREATE TABLE a ();\nCREATE TABLE b (\n  id uuid primay key\n);";
        let pos = sql.find("primay").unwrap() + 1;
        assert_eq!(line_of_position(sql, pos), 3);
        assert_eq!(line_of_position(sql, 1), 1);
        assert_eq!(line_of_position(sql, 0), 1);
    }

    #[test]
    fn non_database_errors_pass_through() {
        let err = describe_error(sqlx::Error::PoolTimedOut, "select 1");
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn close_is_idempotent_without_connection() {
        let mut exec = PgExecutor { conn: None };
        exec.close().await.unwrap();
        assert!(exec.execute_script("select 1").await.is_err());
    }
}
