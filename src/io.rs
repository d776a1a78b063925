use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::result::{bail, Result};

/// Create a scratch directory, inside `base` if given, the system temporary
/// directory otherwise.
///
/// The directory and everything in it is removed when the handle is dropped.
/// **As such, one must not simply get the directory path and drop the handle.**
pub fn scratch_dir(base: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("vidinfo-");

    Ok(match base {
        Some(base) => {
            std::fs::create_dir_all(base)?;
            builder.tempdir_in(base)?
        }
        None => builder.tempdir()?,
    })
}

/// A file inside its own scratch directory, removed on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    _dir: TempDir,
}

impl ScratchFile {
    /// Reserve `file_name` in a fresh scratch directory. The file is not created.
    pub fn reserve(base: Option<&Path>, file_name: &str) -> Result<Self> {
        let dir = scratch_dir(base)?;
        Ok(Self {
            path: dir.path().join(file_name),
            _dir: dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Find a file name in `out_dir` that is not already taken.
///
/// Tries `<stem>.<ext>` first, then `<stem> (2).<ext>`, `<stem> (3).<ext>`...
pub fn find_unused_name(out_dir: &Path, stem: &str, ext: &str) -> Result<PathBuf> {
    unused_name_within(out_dir, stem, ext, u16::MAX)
}

fn unused_name_within(out_dir: &Path, stem: &str, ext: &str, max: u16) -> Result<PathBuf> {
    let mut output = out_dir.join(format!("{stem}.{ext}"));
    if !output.exists() {
        return Ok(output);
    }

    for n in 2..=max {
        output.set_file_name(format!("{stem} ({n}).{ext}"));
        if !output.exists() {
            return Ok(output);
        }
    }

    bail("Too many files with the same name in the gallery directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_file_is_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let file = ScratchFile::reserve(Some(base.path()), "abc123.mp4").unwrap();
        std::fs::write(file.path(), b"data").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn unused_name_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = find_unused_name(dir.path(), "screencap-1", "jpg").unwrap();
        assert!(first.ends_with("screencap-1.jpg"));

        std::fs::write(&first, b"").unwrap();
        let second = find_unused_name(dir.path(), "screencap-1", "jpg").unwrap();
        assert!(second.ends_with("screencap-1 (2).jpg"));
    }

    #[test]
    fn unused_name_gives_up_when_all_taken() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["screencap-1.jpg", "screencap-1 (2).jpg", "screencap-1 (3).jpg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        assert!(unused_name_within(dir.path(), "screencap-1", "jpg", 3).is_err());
        let next = unused_name_within(dir.path(), "screencap-1", "jpg", 4).unwrap();
        assert!(next.ends_with("screencap-1 (4).jpg"));
    }
}
