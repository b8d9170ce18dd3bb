use crate::error::{CycleError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A reader never observes a half-written namelist or job script.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let wrap = |source: std::io::Error| CycleError::WriteFailed {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
    tmp.write_all(data).map_err(wrap)?;
    tmp.persist(path).map_err(|e| wrap(e.error))?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Symlink `src` at `dst`, replacing whatever is already there.
///
/// A missing destination is not an error, nor is a dangling link left by an
/// earlier run. Parents of `dst` are created as needed.
pub fn link_resource(src: &Path, dst: &Path) -> Result<()> {
    match std::fs::remove_file(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    symlink(src, dst)?;
    tracing::debug!(src = %src.display(), dst = %dst.display(), "linked");
    Ok(())
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Move `src` to `dst`.
///
/// Refuses to clobber an existing `dst` unless `overwrite` is set. Falls back
/// to copy-then-remove when a plain rename crosses filesystems (scratch to
/// archive is the common case on HPC systems).
pub fn move_file(src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
    if !src.exists() {
        return Err(CycleError::ArtifactMissing(src.display().to_string()));
    }
    if dst.exists() && !overwrite {
        return Err(CycleError::ArchiveExists(dst.display().to_string()));
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(src, dst).is_err() {
        std::fs::copy(src, dst)?;
        std::fs::remove_file(src)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/input.nml");
        atomic_write(&path, b"&model_nml\n/\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "&model_nml\n/\n");
    }

    #[test]
    fn atomic_write_reports_path_on_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // A regular file cannot be used as a parent directory.
        let err = atomic_write(&blocker.join("input.nml"), b"data").unwrap_err();
        assert!(matches!(err, CycleError::WriteFailed { .. }));
        assert!(err.to_string().contains("input.nml"));
    }

    #[test]
    fn link_into_empty_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("filter");
        std::fs::write(&src, b"bin").unwrap();
        let dst = dir.path().join("run/filter");
        link_resource(&src, &dst).unwrap();
        assert_eq!(std::fs::read_link(&dst).unwrap(), src);
    }

    #[test]
    fn link_twice_leaves_one_valid_link() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("advance_time");
        std::fs::write(&src, b"bin").unwrap();
        let dst = dir.path().join("run/advance_time");
        link_resource(&src, &dst).unwrap();
        link_resource(&src, &dst).unwrap();
        assert_eq!(std::fs::read_link(&dst).unwrap(), src);
        assert_eq!(std::fs::read(&dst).unwrap(), b"bin");
    }

    #[test]
    fn link_replaces_stale_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("rtcoef.dat");
        std::fs::write(&src, b"coef").unwrap();
        let dst = dir.path().join("rtcoef_dummy_5_dummyir.dat");
        std::fs::write(&dst, b"stale copy").unwrap();
        link_resource(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"coef");
    }

    #[test]
    fn link_replaces_dangling_link() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("gone");
        let dst = dir.path().join("filter");
        std::os::unix::fs::symlink(&gone, &dst).unwrap();
        let src = dir.path().join("filter_src");
        std::fs::write(&src, b"bin").unwrap();
        link_resource(&src, &dst).unwrap();
        assert_eq!(std::fs::read_link(&dst).unwrap(), src);
    }

    #[test]
    fn move_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("obs_seq.out");
        let dst = dir.path().join("obs/obs_seq.out.2021010100");
        std::fs::write(&src, b"new").unwrap();
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, b"old").unwrap();

        let err = move_file(&src, &dst, false).unwrap_err();
        assert!(matches!(err, CycleError::ArchiveExists(_)));
        assert_eq!(std::fs::read(&dst).unwrap(), b"old");
        assert!(src.exists());

        move_file(&src, &dst, true).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
        assert!(!src.exists());
    }

    #[test]
    fn move_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = move_file(&dir.path().join("nope"), &dir.path().join("dst"), false).unwrap_err();
        assert!(matches!(err, CycleError::ArtifactMissing(_)));
    }
}
