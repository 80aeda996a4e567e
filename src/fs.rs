// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))
}

/// Create the certificate storage directory if it is absent.
///
/// A directory that cannot be created (permission denied, a regular file in
/// the way) surfaces as [`Error::CreateDir`]; callers abort on it.
pub fn ensure_storage_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| Error::CreateDir {
        path: dir.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %dir.display(), "created storage directory");
    Ok(())
}

/// Atomically write data to a file using a temporary file and rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    // Same directory keeps the rename on one filesystem
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;

    let random_suffix: u64 = rand::Rng::random(&mut rand::rng());
    let temp_path = parent.join(format!(".tmp-{:x}", random_suffix));

    let write_err = |e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    };

    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(contents).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }
        Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    Ok(())
}

/// Restrict a private key written by an external tool to its owner.
#[cfg(unix)]
pub fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
pub fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

/// Remove each file, collecting failures instead of stopping at the first.
/// A file that is already gone counts as removed.
pub fn remove_files(paths: &[&Path]) -> Vec<Error> {
    let mut failures = Vec::new();
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => failures.push(Error::Remove {
                path: PathBuf::from(path),
                source: e,
            }),
        }
    }
    failures
}

/// Names that would collide with the CA or config files in the storage directory.
pub const RESERVED_NAMES: &[&str] = &["myca", "config"];

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name.to_lowercase().as_str())
}
