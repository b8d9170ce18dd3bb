//! Relocating a finished cycle's outputs out of the run directory.

use crate::error::Result;
use crate::io::move_file;
use crate::paths;
use std::path::{Path, PathBuf};

/// Move the job log into `log_dir`. Re-running a date replaces its old log.
pub fn archive_log(log: &Path, log_dir: &Path) -> Result<PathBuf> {
    let name = log.file_name().unwrap_or(log.as_os_str());
    let dst = log_dir.join(name);
    move_file(log, &dst, true)?;
    Ok(dst)
}

/// Stamp `run_dir/<name>` with the cycle date and move it to `obs_dir`.
///
/// The archive destination is checked before anything is renamed, so a
/// refused overwrite leaves the run directory as the job left it.
pub fn archive_artifact(
    run_dir: &Path,
    name: &str,
    date_str: &str,
    obs_dir: &Path,
    overwrite: bool,
) -> Result<PathBuf> {
    let stamped = paths::stamped(name, date_str);
    let produced = run_dir.join(name);
    let dst = obs_dir.join(&stamped);
    if dst.exists() && !overwrite {
        return Err(crate::error::CycleError::ArchiveExists(dst.display().to_string()));
    }
    let renamed = run_dir.join(&stamped);
    move_file(&produced, &renamed, true)?;
    move_file(&renamed, &dst, overwrite)?;
    Ok(dst)
}

/// Keep this cycle's output inflation so the next cycle can warm start:
/// `run_dir/<output>_{mean,sd}.nc` become
/// `<inout>/<date>/member00/<input>_{mean,sd}.nc`. Files the job did not
/// produce are skipped.
pub fn archive_inflation(
    run_dir: &Path,
    inout_state: &Path,
    date_str: &str,
    output_fragment: &str,
    input_fragment: &str,
    overwrite: bool,
) -> Result<Vec<PathBuf>> {
    let mut moved = Vec::new();
    for suffix in ["mean", "sd"] {
        let produced = run_dir.join(paths::inflation_name(output_fragment, suffix));
        if !produced.is_file() {
            tracing::debug!(file = %produced.display(), "no inflation output");
            continue;
        }
        let dst = paths::inflation_file(inout_state, date_str, input_fragment, suffix);
        move_file(&produced, &dst, overwrite)?;
        moved.push(dst);
    }
    Ok(moved)
}
