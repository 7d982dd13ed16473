//! Table existence checks through the Supabase REST (PostgREST) interface.

use crate::config::Settings;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const REST_PATH: &str = "/rest/v1";

/// Tables the platform backend expects to exist.
pub const DEFAULT_TABLES: &[&str] = &[
    "users",
    "courses",
    "enrollments",
    "lessons",
    "mentorships",
    "mentorship_sessions",
    "mentorship_bookings",
    "portfolios",
    "transactions",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    Present,
    Missing,
    Error { http_status: u16, body: String },
    Unreachable { detail: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub status: TableStatus,
}

impl TableReport {
    pub fn is_present(&self) -> bool {
        self.status == TableStatus::Present
    }
}

#[derive(Debug, Clone)]
pub struct RestVerifier {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestVerifier {
    /// Fails with a configuration error before any request if the URL or key is missing.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_supabase_url()?.to_string();
        let api_key = settings.require_supabase_api_key()?.to_string();

        let timeout_secs = std::env::var("SUPABASE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build supabase http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> Result<String> {
        table_url(&self.base_url, table)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        Ok(headers)
    }

    pub async fn check_table(&self, table: &str) -> Result<TableReport> {
        let url = self.table_url(table)?;
        let headers = self.headers()?;

        let status = match self
            .http
            .get(url)
            .headers(headers)
            .query(&[("limit", "0")])
            .send()
            .await
        {
            Ok(res) => {
                let code = res.status();
                let body = res.text().await.unwrap_or_default();
                classify(code, &body)
            }
            Err(err) => TableStatus::Unreachable {
                detail: err.to_string(),
            },
        };

        match &status {
            TableStatus::Present => tracing::info!(%table, "table present"),
            TableStatus::Missing => tracing::warn!(%table, "table missing"),
            other => tracing::error!(%table, status = ?other, "table check failed"),
        }

        Ok(TableReport {
            table: table.to_string(),
            status,
        })
    }

    /// Checks tables one after another, in the given order.
    pub async fn verify_tables(&self, tables: &[String]) -> Result<Vec<TableReport>> {
        let mut out = Vec::with_capacity(tables.len());
        for table in tables {
            out.push(self.check_table(table).await?);
        }
        Ok(out)
    }
}

fn table_url(base_url: &str, table: &str) -> Result<String> {
    anyhow::ensure!(
        !table.is_empty() && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "invalid table name: {table:?}"
    );
    Ok(format!(
        "{}{REST_PATH}/{table}",
        base_url.trim_end_matches('/')
    ))
}

/// PostgREST answers 404 (PGRST205) for an unknown table; older versions pass through
/// Postgres' `42P01 undefined_table` as a 4xx. 5xx, 401 and 403 stay errors even when their
/// message mentions something that does not exist.
fn classify(status: StatusCode, body: &str) -> TableStatus {
    if status.is_success() {
        return TableStatus::Present;
    }
    let names_missing_relation = body.contains("42P01")
        || body.contains("PGRST205")
        || body.contains("does not exist");
    let auth_failure = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN);
    if status == StatusCode::NOT_FOUND
        || (status.is_client_error() && !auth_failure && names_missing_relation)
    {
        return TableStatus::Missing;
    }
    TableStatus::Error {
        http_status: status.as_u16(),
        body: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::error::MigrationError;
    use serde_json::json;

    #[test]
    fn builds_rest_table_url() {
        assert_eq!(
            table_url("https://abc.supabase.co/", "mentorship_sessions").unwrap(),
            "https://abc.supabase.co/rest/v1/mentorship_sessions"
        );
        assert!(table_url("https://abc.supabase.co", "users?select=*").is_err());
        assert!(table_url("https://abc.supabase.co", "").is_err());
    }

    #[test]
    fn classifies_responses() {
        assert_eq!(classify(StatusCode::OK, "[]"), TableStatus::Present);
        assert_eq!(
            classify(
                StatusCode::NOT_FOUND,
                r#"{"code":"PGRST205","message":"Could not find the table 'public.blog' in the schema cache"}"#
            ),
            TableStatus::Missing
        );
        assert_eq!(
            classify(
                StatusCode::BAD_REQUEST,
                r#"{"code":"42P01","message":"relation \"public.blog\" does not exist"}"#
            ),
            TableStatus::Missing
        );
        assert_eq!(
            classify(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"code":"42883","message":"function public.is_admin() does not exist"}"#
            ),
            TableStatus::Error {
                http_status: 500,
                body: r#"{"code":"42883","message":"function public.is_admin() does not exist"}"#
                    .to_string()
            }
        );
        assert!(matches!(
            classify(
                StatusCode::UNAUTHORIZED,
                r#"{"message":"role \"authenticator\" does not exist"}"#
            ),
            TableStatus::Error { http_status: 401, .. }
        ));
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, "Invalid API key"),
            TableStatus::Error {
                http_status: 401,
                body: "Invalid API key".to_string()
            }
        );
    }

    #[test]
    fn missing_credentials_fail_before_any_request() {
        let settings = Settings {
            supabase_url: Some("https://abc.supabase.co".to_string()),
            ..Default::default()
        };
        let err = RestVerifier::from_settings(&settings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::Configuration { .. })
        ));
    }

    #[test]
    fn report_serializes_flat() {
        let report = TableReport {
            table: "users".to_string(),
            status: TableStatus::Error {
                http_status: 500,
                body: "boom".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"table": "users", "status": "error", "http_status": 500, "body": "boom"})
        );
    }
}
