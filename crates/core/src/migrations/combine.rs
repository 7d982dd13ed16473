//! Manual-apply fallback: every migration concatenated into one artifact that can be pasted into
//! the hosted SQL editor when no direct connection is available.

use crate::migrations::file::MigrationFile;
use anyhow::Context;
use std::path::{Path, PathBuf};

pub const COMBINED_FILENAME: &str = "_COMBINED_MIGRATIONS.sql";

const RULE: &str =
    "-- ============================================================================";
const NAME_MARKER: &str = "-- MIGRATION: ";

pub fn default_output_path(dir: &Path) -> PathBuf {
    dir.join(COMBINED_FILENAME)
}

/// Renders each file behind a banner naming it, in the given order.
pub fn render(files: &[MigrationFile]) -> String {
    let mut out = String::with_capacity(files.iter().map(|f| f.sql.len() + 200).sum());
    for file in files {
        out.push('\n');
        out.push_str(RULE);
        out.push('\n');
        out.push_str(NAME_MARKER);
        out.push_str(&file.filename);
        out.push('\n');
        out.push_str(RULE);
        out.push_str("\n\n");
        out.push_str(&file.sql);
        out.push_str("\n\n");
    }
    out
}

pub fn combine(files: &[MigrationFile], output_path: &Path) -> anyhow::Result<()> {
    std::fs::write(output_path, render(files))
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    tracing::info!(
        output = %output_path.display(),
        files = files.len(),
        "wrote combined migrations"
    );
    Ok(())
}

/// Inverse of [`render`]: returns `(filename, text)` per banner, text exactly as it was.
///
/// A migration whose own text contains a full banner header cannot be split back unambiguously.
pub fn split_combined(content: &str) -> anyhow::Result<Vec<(String, String)>> {
    let header = format!("\n{RULE}\n{NAME_MARKER}");
    let starts: Vec<usize> = content.match_indices(&header).map(|(i, _)| i).collect();

    if content.is_empty() {
        return Ok(Vec::new());
    }
    anyhow::ensure!(
        starts.first() == Some(&0),
        "combined migrations must start with a banner"
    );

    let mut out = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(content.len());
        let section = &content[start + header.len()..end];

        let (filename, rest) = section
            .split_once('\n')
            .context("banner is missing its closing rule")?;
        let body = rest
            .strip_prefix(RULE)
            .and_then(|r| r.strip_prefix("\n\n"))
            .with_context(|| format!("malformed banner for {filename}"))?;
        let text = body
            .strip_suffix("\n\n")
            .with_context(|| format!("missing section terminator after {filename}"))?;

        out.push((filename.to_string(), text.to_string()));
    }
    Ok(out)
}
