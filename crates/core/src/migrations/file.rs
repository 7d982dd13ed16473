use crate::migrations::error::MigrationError;
use std::path::{Path, PathBuf};

const SQL_EXTENSION: &str = ".sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub filename: String,
    pub ordinal: u64,
    pub path: PathBuf,
    pub sql: String,
}

impl MigrationFile {
    pub fn size_bytes(&self) -> usize {
        self.sql.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// Declared placement overrides, by ordinal.
///
/// Row-level-security policies reference tables created by earlier migrations, so the policy
/// files are pinned last; the full-schema file is pinned first. Listed ordinals keep their
/// declared order within their group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingRules {
    pub first: Vec<u64>,
    pub last: Vec<u64>,
}

impl Default for OrderingRules {
    fn default() -> Self {
        Self {
            first: vec![0],
            last: vec![10, 11],
        }
    }
}

impl OrderingRules {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(both) = self.first.iter().find(|o| self.last.contains(o)) {
            anyhow::bail!("migration ordinal {both} cannot be pinned both first and last");
        }
        Ok(())
    }

    fn sort_key(&self, file: &MigrationFile) -> (u8, usize, u64) {
        if let Some(pos) = self.first.iter().position(|o| *o == file.ordinal) {
            return (0, pos, file.ordinal);
        }
        if let Some(pos) = self.last.iter().position(|o| *o == file.ordinal) {
            return (2, pos, file.ordinal);
        }
        (1, 0, file.ordinal)
    }
}

/// Parses `<digits>_<description>.sql`, returning the ordinal.
///
/// Anything else (no leading digits, no description, other extension, ordinal overflow) is
/// not a migration file.
pub fn parse_migration_name(filename: &str) -> Option<u64> {
    let stem = filename.strip_suffix(SQL_EXTENSION)?;
    let digits_end = stem
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)?;
    if digits_end == 0 {
        return None;
    }
    let description = stem[digits_end..].strip_prefix('_')?;
    if description.trim().is_empty() {
        return None;
    }
    stem[..digits_end].parse::<u64>().ok()
}

/// Lists and orders the migration files in `dir`.
///
/// Files not matching the naming convention are skipped without error.
pub fn discover(dir: &Path, rules: &OrderingRules) -> anyhow::Result<Vec<MigrationFile>> {
    rules.validate()?;

    if !dir.is_dir() {
        return Err(MigrationError::Discovery {
            path: dir.to_path_buf(),
            detail: "directory does not exist".to_string(),
        }
        .into());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| MigrationError::Discovery {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::Discovery {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
        else {
            tracing::debug!(path = %path.display(), "skipping non UTF-8 file name");
            continue;
        };

        let Some(ordinal) = parse_migration_name(&filename) else {
            tracing::debug!(%filename, "skipping file without migration prefix");
            continue;
        };

        let sql = std::fs::read_to_string(&path).map_err(|e| MigrationError::Discovery {
            path: path.clone(),
            detail: e.to_string(),
        })?;

        files.push(MigrationFile {
            filename,
            ordinal,
            path,
            sql,
        });
    }

    order(&mut files, rules);
    Ok(files)
}

/// Sorts in place: pinned-first group, the rest by ordinal, pinned-last group. Filename breaks
/// ties so the result never depends on directory listing order.
pub fn order(files: &mut [MigrationFile], rules: &OrderingRules) {
    files.sort_by(|a, b| {
        rules
            .sort_key(a)
            .cmp(&rules.sort_key(b))
            .then_with(|| a.filename.cmp(&b.filename))
    });
}
