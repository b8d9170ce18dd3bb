use dacycle_core::paths::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the `params.yaml` to load.
///
/// Priority:
/// 1. `--config` flag / `DACYCLE_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `params.yaml`
/// 3. Fall back to `cwd/params.yaml`, which reports as not found on load
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or_else(|| cwd.join(CONFIG_FILE))
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}
