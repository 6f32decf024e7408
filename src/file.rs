//! Path resolution and create-new persistence for container I/O.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::types::EncryptorError;

/// Extension given to containers when no output path is supplied.
pub const ENCRYPTED_EXTENSION: &str = "encrypted";

/// Default container path: the input path with its extension replaced.
///
/// `notes/Test.pdf` becomes `notes/Test.encrypted`.
pub fn encrypted_output_path(input: &Path) -> PathBuf {
    input.with_extension(ENCRYPTED_EXTENSION)
}

/// Where a decrypted file goes: next to its container, under the stored name.
pub fn decrypted_output_path(container: &Path, file_name: &str) -> PathBuf {
    parent_dir(container).join(file_name)
}

/// Ensure `path` names an existing regular file.
pub fn check_input_file(path: &Path) -> Result<(), EncryptorError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EncryptorError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        return Err(EncryptorError::NotSupportedOperation(
            "directories are not supported",
        ));
    }
    if !meta.is_file() {
        return Err(EncryptorError::NotSupportedOperation(
            "input is not a regular file",
        ));
    }
    Ok(())
}

/// Fail early if something already exists at `target`.
pub fn ensure_absent(target: &Path) -> Result<(), EncryptorError> {
    // symlink_metadata so a dangling link still counts as occupied.
    if fs::symlink_metadata(target).is_ok() {
        return Err(EncryptorError::OutputAlreadyExists(target.to_path_buf()));
    }
    Ok(())
}

/// Create a temporary file next to `target`.
///
/// The file is removed when dropped unless handed to [`persist_new`].
pub fn create_staging_file(target: &Path) -> Result<NamedTempFile, EncryptorError> {
    let parent = parent_dir(target);
    let tmp = tempfile::Builder::new()
        .prefix(".encryptor-")
        .suffix(".part")
        .tempfile_in(parent)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
    }
    Ok(tmp)
}

/// Atomically move `tmp` to `target`, refusing to replace an existing file.
pub fn persist_new(tmp: NamedTempFile, target: &Path) -> Result<PathBuf, EncryptorError> {
    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(target.to_path_buf()),
        // The temp file inside the error is dropped (and deleted) here.
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(EncryptorError::OutputAlreadyExists(target.to_path_buf()))
        }
        Err(e) => Err(EncryptorError::Io(e.error)),
    }
}

/// Directory containing `path`; `.` for bare file names.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
