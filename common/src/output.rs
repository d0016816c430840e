//! Collision-free output paths.
//!
//! When the desired file already exists a ` (n)` marker is inserted before
//! the extension, counting up from 1 until a free name is found.  The check
//! is not a reservation: another writer may still create the file between
//! the check and the capture tool opening it.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Default upper bound for the disambiguation counter.
pub const MAX_SUFFIX: u32 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum AllocateError {
    #[error("No free file name for {path} after {limit} attempts")]
    Exhausted { path: PathBuf, limit: u32 },
}

/// Return a path under `dir` for `file_name` that does not exist on disk.
pub fn allocate(dir: &Path, file_name: &str, limit: u32) -> Result<PathBuf, AllocateError> {
    allocate_with(dir, file_name, limit, |p| p.exists())
}

/// Same as [`allocate`] with the existence check supplied by the caller.
pub fn allocate_with(
    dir: &Path,
    file_name: &str,
    limit: u32,
    exists: impl Fn(&Path) -> bool,
) -> Result<PathBuf, AllocateError> {
    let mut path = dir.join(file_name);
    let mut name = file_name.to_string();
    let mut n: u32 = 0;

    while exists(&path) {
        warn!("File already exists, will add numbers: {}", path.display());
        n += 1;
        if n > limit {
            return Err(AllocateError::Exhausted {
                path: dir.join(file_name),
                limit,
            });
        }

        let (stem, ext) = split_extension(&name);
        let previous = format!(" ({})", n - 1);
        let stem = if n > 1 {
            stem.strip_suffix(previous.as_str()).unwrap_or(stem)
        } else {
            stem
        };
        name = format!("{stem} ({n}){ext}");
        path = dir.join(&name);
    }

    Ok(path)
}

/// Split `name` into stem and extension (with its leading dot).  A leading
/// dot alone does not start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
