//! Local file enumeration and date filtering
//!
//! Walks the sync root and yields every regular file exactly once, at any
//! depth, in relative-path order. Symlinks and special files are not
//! regular files and are skipped.

use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use stowage_core::domain::{DomainError, LocalFile};
use tracing::{debug, trace, warn};

/// Result of walking a sync root
#[derive(Debug, Default)]
pub struct Walk {
    /// Regular files, sorted by relative path
    pub files: Vec<LocalFile>,
    /// Lossy relative paths of files whose names are not valid UTF-8.
    ///
    /// These cannot be named remotely without colliding with other files,
    /// so they are reported instead of uploaded.
    pub invalid_names: Vec<String>,
}

/// Lists every regular file under `root`, sorted by relative path.
///
/// Relative paths use `/` separators whatever the platform.
pub async fn enumerate_files(root: &Path) -> io::Result<Walk> {
    let mut files = Vec::new();
    let mut invalid_names = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative_path = match relative_path(root, &path) {
                    Some(Ok(relative_path)) => relative_path,
                    Some(Err(lossy)) => {
                        warn!(path = %lossy, "Skipping file with non UTF-8 name");
                        invalid_names.push(lossy);
                        continue;
                    }
                    None => continue,
                };
                let metadata = entry.metadata().await?;
                files.push(LocalFile {
                    path,
                    relative_path,
                    size: metadata.len(),
                    mtime_ms: mtime_ms(metadata.modified().ok()),
                });
            } else {
                trace!(path = %path.display(), "Skipping non-regular file");
            }
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    invalid_names.sort();
    debug!(
        root = %root.display(),
        files = files.len(),
        invalid_names = invalid_names.len(),
        "Enumerated sync root"
    );
    Ok(Walk {
        files,
        invalid_names,
    })
}

/// `/`-joined path below `root`, or the lossy form when a component is not UTF-8
fn relative_path(root: &Path, path: &Path) -> Option<Result<String, String>> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&std::ffi::OsStr> = relative.components().map(|c| c.as_os_str()).collect();
    if parts.is_empty() {
        return None;
    }
    let exact: Option<Vec<&str>> = parts.iter().map(|p| p.to_str()).collect();
    Some(match exact {
        Some(parts) => Ok(parts.join("/")),
        None => Err(parts
            .iter()
            .map(|p| p.to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")),
    })
}

/// Milliseconds since the Unix epoch; negative before it, 0 when unknown
fn mtime_ms(modified: Option<SystemTime>) -> i64 {
    match modified.map(|t| t.duration_since(UNIX_EPOCH)) {
        Some(Ok(d)) => d.as_millis() as i64,
        Some(Err(e)) => -(e.duration().as_millis() as i64),
        None => 0,
    }
}

/// Joins the remote prefix and a relative path with `/`
pub fn remote_path(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

// ============================================================================
// Date filter
// ============================================================================

/// Inclusive date window applied to date-partitioned paths.
///
/// The date of a path is its first `/`-separated component shaped like
/// `YYYY-MM-DD`. It is compared as text against the bounds, so a
/// component such as `2024-02-30` is still dated and ordered between
/// `2024-02-29` and `2024-03-01`. Paths without such a component always
/// pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateFilter {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateFilter {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        Self { since, until }
    }

    /// Parses optional `YYYY-MM-DD` bounds
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Result<Self, DomainError> {
        let parse = |s: &str| parse_date(s).ok_or_else(|| DomainError::InvalidDate(s.to_string()));
        Ok(Self {
            since: since.map(parse).transpose()?,
            until: until.map(parse).transpose()?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        let Some(date) = path_date(relative_path) else {
            return true;
        };
        self.since
            .map_or(true, |since| date >= since.format(DATE_FORMAT).to_string().as_str())
            && self
                .until
                .map_or(true, |until| date <= until.format(DATE_FORMAT).to_string().as_str())
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// First path component shaped like `YYYY-MM-DD`, not checked against the calendar
pub fn path_date(relative_path: &str) -> Option<&str> {
    relative_path.split('/').find(|c| is_date_shaped(c))
}

fn is_date_shaped(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if !is_date_shaped(s) {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}
