use anyhow::Context;
use pqtrader_core::migrations::file::MigrationFile;
use pqtrader_core::migrations::runner::RunSummary;
use pqtrader_core::verify::{TableReport, TableStatus};
use serde::Serialize;
use std::path::Path;

const RULE_WIDTH: usize = 70;

fn line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

/// Pretty JSON for `--json`; nothing else is written to stdout in that mode.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize report as JSON")
}

pub fn render_plan(dir: &Path, files: &[MigrationFile]) -> String {
    let mut out = String::new();
    if files.is_empty() {
        line(&mut out, &format!("No migration files found in {}", dir.display()));
        return out;
    }

    line(
        &mut out,
        &format!("{} migration(s) in {}, in apply order:", files.len(), dir.display()),
    );
    for (i, f) in files.iter().enumerate() {
        let note = if f.is_empty() { ", empty: skipped" } else { "" };
        line(
            &mut out,
            &format!("  {:>3}. {} ({} bytes{note})", i + 1, f.filename, f.size_bytes()),
        );
    }
    out
}

pub fn render_summary(summary: &RunSummary) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    line(&mut out, &rule);
    for r in &summary.results {
        let text = match (&r.error, r.skipped_empty) {
            (Some(err), _) => format!("FAILED   {}: {err}", r.filename),
            (None, true) => format!("SKIPPED  {} (empty)", r.filename),
            (None, false) => format!("APPLIED  {}", r.filename),
        };
        line(&mut out, &text);
    }
    for name in &summary.not_attempted {
        line(&mut out, &format!("PENDING  {name} (not attempted)"));
    }

    let elapsed = summary.finished_at - summary.started_at;
    line(&mut out, &rule);
    line(
        &mut out,
        &format!(
            "SUMMARY: {} succeeded, {} failed, {} not attempted ({} ms)",
            summary.succeeded(),
            summary.failed(),
            summary.not_attempted.len(),
            elapsed.num_milliseconds()
        ),
    );
    out
}

pub fn render_combined(output: &Path, files: &[MigrationFile]) -> String {
    [
        format!("Wrote {} migration(s) to {}", files.len(), output.display()),
        "To apply manually:".to_string(),
        "  1. Open the project's SQL Editor in the Supabase dashboard".to_string(),
        format!("  2. Paste the full contents of {}", output.display()),
        "  3. Run it".to_string(),
    ]
    .iter()
    .map(|l| format!("{l}\n"))
    .collect()
}

pub fn render_tables(reports: &[TableReport]) -> String {
    let mut out = String::new();
    for r in reports {
        let text = match &r.status {
            TableStatus::Present => format!("OK       {}", r.table),
            TableStatus::Missing => format!("MISSING  {}", r.table),
            TableStatus::Error { http_status, body } => {
                format!("ERROR    {} (HTTP {http_status}): {}", r.table, body.trim())
            }
            TableStatus::Unreachable { detail } => {
                format!("ERROR    {}: {detail}", r.table)
            }
        };
        line(&mut out, &text);
    }
    let present = reports.iter().filter(|r| r.is_present()).count();
    line(&mut out, &format!("{present}/{} tables present", reports.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pqtrader_core::migrations::runner::MigrationResult;
    use std::path::PathBuf;

    fn result(
        name: &str,
        succeeded: bool,
        skipped_empty: bool,
        error: Option<&str>,
    ) -> MigrationResult {
        MigrationResult {
            filename: name.to_string(),
            succeeded,
            skipped_empty,
            error: error.map(str::to_string),
        }
    }

    fn sample_summary() -> RunSummary {
        let started_at = Utc.with_ymd_and_hms(2026, 1, 28, 9, 0, 0).unwrap();
        RunSummary {
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1250),
            results: vec![
                result("000_full_schema.sql", true, false, None),
                result("005_empty.sql", true, true, None),
                result("009_create_mentor_schedules.sql", false, false, Some("relation exists")),
            ],
            not_attempted: vec!["010_enable_rls_policies.sql".to_string()],
        }
    }

    #[test]
    fn summary_lists_each_outcome() {
        let out = render_summary(&sample_summary());
        assert!(out.contains("APPLIED  000_full_schema.sql"));
        assert!(out.contains("SKIPPED  005_empty.sql (empty)"));
        assert!(out.contains("FAILED   009_create_mentor_schedules.sql: relation exists"));
        assert!(out.contains("PENDING  010_enable_rls_policies.sql"));
        assert!(out.contains("SUMMARY: 2 succeeded, 1 failed, 1 not attempted (1250 ms)"));
    }

    #[test]
    fn plan_marks_empty_files() {
        let files = vec![
            MigrationFile {
                filename: "001_users.sql".to_string(),
                ordinal: 1,
                path: PathBuf::from("001_users.sql"),
                sql: "select 1;".to_string(),
            },
            MigrationFile {
                filename: "002_noop.sql".to_string(),
                ordinal: 2,
                path: PathBuf::from("002_noop.sql"),
                sql: String::new(),
            },
        ];
        let out = render_plan(Path::new("supabase_migrations"), &files);
        assert!(out.contains("    1. 001_users.sql (9 bytes)"));
        assert!(out.contains("    2. 002_noop.sql (0 bytes, empty: skipped)"));
    }

    #[test]
    fn tables_report_counts_present() {
        let reports = vec![
            TableReport {
                table: "users".to_string(),
                status: TableStatus::Present,
            },
            TableReport {
                table: "blog_posts".to_string(),
                status: TableStatus::Missing,
            },
        ];
        let out = render_tables(&reports);
        assert!(out.contains("OK       users"));
        assert!(out.contains("MISSING  blog_posts"));
        assert!(out.ends_with("1/2 tables present\n"));
    }

    #[test]
    fn summary_json_is_a_single_document() {
        let out = render_json(&sample_summary()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["results"].as_array().unwrap().len(), 3);
        assert_eq!(v["results"][2]["succeeded"], false);
        assert_eq!(v["results"][2]["error"], "relation exists");
        assert_eq!(v["not_attempted"][0], "010_enable_rls_policies.sql");
        assert_eq!(v["started_at"], "2026-01-28T09:00:00Z");
    }

    #[test]
    fn tables_json_is_a_single_document() {
        let reports = vec![TableReport {
            table: "users".to_string(),
            status: TableStatus::Unreachable {
                detail: "connection refused".to_string(),
            },
        }];
        let out = render_json(&reports).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v[0]["table"], "users");
        assert_eq!(v[0]["status"], "unreachable");
        assert_eq!(v[0]["detail"], "connection refused");
    }
}
