/*!
    Output file naming and folder size management.
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use media_types::Result;

const BYTES_PER_MB: u64 = 1024 * 1024;

/**
    The `" - YYYY-MM-DD HH-MM-SS"` suffix inserted before the extension.
*/
pub fn timestamp_suffix(time: NaiveDateTime) -> String {
    time.format(" - %Y-%m-%d %H-%M-%S").to_string()
}

/**
    Build a file name from its parts, with an optional time stamp.
*/
pub fn file_name(base_name: &str, extension: &str, timestamp: Option<NaiveDateTime>) -> String {
    let suffix = timestamp.map(timestamp_suffix).unwrap_or_default();
    format!("{base_name}{suffix}.{extension}")
}

/**
    Pick a path for a new file that does not collide with an existing one.

    Two fragments started within the same second would share a name, so a
    counter is appended in that case.
*/
pub(crate) fn unused_path(
    folder: &Path,
    base_name: &str,
    extension: &str,
    timestamp: Option<NaiveDateTime>,
) -> PathBuf {
    let path = folder.join(file_name(base_name, extension, timestamp));
    if !path.exists() {
        return path;
    }

    let stem = file_name(base_name, extension, timestamp);
    let stem = stem.trim_end_matches(&format!(".{extension}"));
    (2..)
        .map(|n| folder.join(format!("{stem} ({n}).{extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}

/**
    Returns true if `name` looks like a file written for `base_name`.
*/
fn is_own_file(name: &str, base_name: &str, extension: &str) -> bool {
    name.starts_with(base_name)
        && name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension))
}

/**
    Delete the oldest files of this writer until the folder fits the budget.

    The folder size counts every regular file in it, but only files whose
    names start with `base_name` and end with `extension` are deleted,
    oldest modification time first. `keep` (the file being written) is
    never deleted. Returns the paths that were removed.
*/
pub fn enforce_folder_budget(
    folder: &Path,
    base_name: &str,
    extension: &str,
    max_megabytes: u64,
    keep: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let budget = max_megabytes.saturating_mul(BYTES_PER_MB);

    let mut total = 0u64;
    let mut candidates: Vec<(SystemTime, PathBuf, u64)> = Vec::new();

    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        total += metadata.len();

        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_kept = keep.is_some_and(|keep| keep == path.as_path());
        if is_kept || !is_own_file(name, base_name, extension) {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, path, metadata.len()));
    }

    // Oldest first; names carry the time stamp so they break ties
    candidates.sort();

    let mut removed = Vec::new();
    for (_, path, size) in candidates {
        if total <= budget {
            break;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), size, "deleted old recording");
                total = total.saturating_sub(size);
                removed.push(path);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete old recording"),
        }
    }

    Ok(removed)
}
