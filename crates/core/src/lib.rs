pub mod migrations;
pub mod storage;
pub mod verify;

pub mod config {
    use crate::migrations::error::MigrationError;
    use crate::migrations::file::OrderingRules;
    use anyhow::Context;
    use sqlx::postgres::PgSslMode;
    use std::fmt;
    use std::str::FromStr;

    const DEFAULT_DB_HOST: &str = "db.supabase.co";
    const DEFAULT_DB_PORT: u16 = 5432;
    const DEFAULT_MIGRATIONS_DIR: &str = "supabase_migrations";

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub db_host: Option<String>,
        pub db_port: Option<String>,
        pub db_name: Option<String>,
        pub db_user: Option<String>,
        pub db_password: Option<String>,
        pub db_sslmode: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_service_role_key: Option<String>,
        pub supabase_anon_key: Option<String>,
        pub migrations_dir: Option<String>,
        pub migrations_run_first: Option<String>,
        pub migrations_run_last: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                db_host: std::env::var("DB_HOST").ok(),
                db_port: std::env::var("DB_PORT").ok(),
                db_name: std::env::var("DB_NAME").ok(),
                db_user: std::env::var("DB_USER").ok(),
                db_password: std::env::var("DB_PASSWORD").ok(),
                db_sslmode: std::env::var("DB_SSLMODE").ok(),
                // The frontend's Vite-prefixed names are accepted as fallbacks.
                supabase_url: std::env::var("SUPABASE_URL")
                    .or_else(|_| std::env::var("VITE_SUPABASE_URL"))
                    .ok(),
                supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
                supabase_anon_key: std::env::var("SUPABASE_ANON_KEY")
                    .or_else(|_| std::env::var("VITE_SUPABASE_ANON_KEY"))
                    .ok(),
                migrations_dir: std::env::var("MIGRATIONS_DIR").ok(),
                migrations_run_first: std::env::var("MIGRATIONS_RUN_FIRST").ok(),
                migrations_run_last: std::env::var("MIGRATIONS_RUN_LAST").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_supabase_url(&self) -> anyhow::Result<&str> {
            non_blank(&self.supabase_url).ok_or_else(|| {
                MigrationError::Configuration {
                    missing: vec!["SUPABASE_URL"],
                }
                .into()
            })
        }

        /// Service role key if present, otherwise the anon key.
        pub fn require_supabase_api_key(&self) -> anyhow::Result<&str> {
            non_blank(&self.supabase_service_role_key)
                .or_else(|| non_blank(&self.supabase_anon_key))
                .ok_or_else(|| {
                    MigrationError::Configuration {
                        missing: vec!["SUPABASE_SERVICE_ROLE_KEY or SUPABASE_ANON_KEY"],
                    }
                    .into()
                })
        }

        pub fn migrations_dir(&self) -> &str {
            non_blank(&self.migrations_dir).unwrap_or(DEFAULT_MIGRATIONS_DIR)
        }

        pub fn ordering_rules(&self) -> anyhow::Result<OrderingRules> {
            let mut rules = OrderingRules::default();
            if let Some(s) = non_blank(&self.migrations_run_first) {
                rules.first = parse_ordinal_list(s).context("invalid MIGRATIONS_RUN_FIRST")?;
            }
            if let Some(s) = non_blank(&self.migrations_run_last) {
                rules.last = parse_ordinal_list(s).context("invalid MIGRATIONS_RUN_LAST")?;
            }
            rules.validate()?;
            Ok(rules)
        }
    }

    /// Target database for the migration runner.
    #[derive(Clone)]
    pub struct ConnectionConfig {
        pub host: String,
        pub port: u16,
        pub database: String,
        pub user: String,
        pub password: String,
        pub ssl_mode: PgSslMode,
    }

    impl ConnectionConfig {
        /// Fails with `MigrationError::Configuration` naming every missing variable.
        pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
            let mut missing = Vec::new();
            let database = non_blank(&settings.db_name);
            let user = non_blank(&settings.db_user);
            let password = non_blank(&settings.db_password);
            if database.is_none() {
                missing.push("DB_NAME");
            }
            if user.is_none() {
                missing.push("DB_USER");
            }
            if password.is_none() {
                missing.push("DB_PASSWORD");
            }
            let (Some(database), Some(user), Some(password)) = (database, user, password) else {
                return Err(MigrationError::Configuration { missing }.into());
            };

            let port = match non_blank(&settings.db_port) {
                Some(s) => s
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("DB_PORT must be a port number (got {s})"))?,
                None => DEFAULT_DB_PORT,
            };

            let ssl_mode = match non_blank(&settings.db_sslmode) {
                Some(s) => PgSslMode::from_str(s.trim())
                    .with_context(|| format!("DB_SSLMODE is not a valid sslmode (got {s})"))?,
                None => PgSslMode::Require,
            };

            Ok(Self {
                host: non_blank(&settings.db_host)
                    .unwrap_or(DEFAULT_DB_HOST)
                    .to_string(),
                port,
                database: database.to_string(),
                user: user.to_string(),
                password: password.to_string(),
                ssl_mode,
            })
        }
    }

    impl fmt::Debug for ConnectionConfig {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ConnectionConfig")
                .field("host", &self.host)
                .field("port", &self.port)
                .field("database", &self.database)
                .field("user", &self.user)
                .field("password", &"<redacted>")
                .field("ssl_mode", &self.ssl_mode)
                .finish()
        }
    }

    fn non_blank(v: &Option<String>) -> Option<&str> {
        v.as_deref().filter(|s| !s.trim().is_empty())
    }

    fn parse_ordinal_list(s: &str) -> anyhow::Result<Vec<u64>> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            out.push(
                part.parse::<u64>()
                    .with_context(|| format!("not a migration ordinal: {part}"))?,
            );
        }
        Ok(out)
    }

}
