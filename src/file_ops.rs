//! File encryption/decryption operations
//!
//! Encrypting `name.ext` writes the container to `name.ext.smai` next to it;
//! decrypting `name.ext.smai` writes the plaintext back to `name.ext`. Both
//! outputs are written atomically (tempfile + fsync + rename), so the
//! destination path never holds a partial file.
//!
//! Operations are stateless and may run concurrently on different files.
//! Concurrent operations that resolve to the same output path race on the
//! final rename; callers must serialize those themselves.

use crate::container;
use crate::error::{ErrorCategory, ErrorKind, Result, SmaiError};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name extension identifying a container
pub const CONTAINER_EXTENSION: &str = "smai";

/// What to do when the output path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Fail with [`ErrorKind::OutputExists`] and leave the existing file alone.
    FailIfExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    pub overwrite: OverwritePolicy,
}

/// Path of the container produced by encrypting `path`.
pub fn encrypted_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(CONTAINER_EXTENSION);
    PathBuf::from(name)
}

/// Path of the plaintext produced by decrypting `path`, or `None` if `path`
/// does not name a container.
///
/// Only the trailing `.smai` is removed: `a.tar.gz.smai` becomes `a.tar.gz`.
pub fn decrypted_path(path: &Path) -> Option<PathBuf> {
    if path.extension() != Some(OsStr::new(CONTAINER_EXTENSION)) {
        return None;
    }
    match path.file_stem() {
        Some(stem) if stem != "." && stem != ".." => Some(path.with_extension("")),
        _ => None,
    }
}

/// Encrypt the file at `path` with `password`, overwriting any existing
/// container. Returns the path of the written container.
pub fn encrypt_file(path: &Path, password: &str) -> Result<PathBuf> {
    encrypt_file_with_options(path, password, &Options::default())
}

/// Encrypt the file at `path` with `password`.
///
/// The container is written to `path` with `.smai` appended, with mode
/// 0o600 on Unix systems.
pub fn encrypt_file_with_options(path: &Path, password: &str, options: &Options) -> Result<PathBuf> {
    let output_path = encrypted_path(path);
    let plaintext = fs::read(path).map_err(|e| read_error(path, e))?;
    debug!(path = %path.display(), bytes = plaintext.len(), "read plaintext");
    check_output_policy(&output_path, options.overwrite)?;

    let container =
        container::seal(password, &plaintext).map_err(|e| e.with_context("encryption failed"))?;
    write_file_atomic(&output_path, &container, options.overwrite)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    debug!(output = %output_path.display(), bytes = container.len(), "wrote container");

    Ok(output_path)
}

/// Decrypt the container at `path` with `password`, overwriting any
/// existing plaintext file. Returns the path of the written plaintext.
pub fn decrypt_file(path: &Path, password: &str) -> Result<PathBuf> {
    decrypt_file_with_options(path, password, &Options::default())
}

/// Decrypt the container at `path` with `password`.
///
/// `path` must end in `.smai`; anything else is rejected before touching
/// the filesystem. The plaintext is written to `path` minus that suffix,
/// with mode 0o600 on Unix systems.
pub fn decrypt_file_with_options(path: &Path, password: &str, options: &Options) -> Result<PathBuf> {
    let output_path = decrypted_path(path).ok_or_else(|| {
        SmaiError::with_kind(
            ErrorCategory::User,
            ErrorKind::MalformedContainer,
            format!(
                "{} does not have the .{} extension",
                path.display(),
                CONTAINER_EXTENSION
            ),
        )
    })?;
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "read container");
    check_output_policy(&output_path, options.overwrite)?;

    let plaintext =
        container::open(password, &bytes).map_err(|e| e.with_context("failed to decrypt"))?;
    write_file_atomic(&output_path, &plaintext, options.overwrite)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    debug!(output = %output_path.display(), bytes = plaintext.len(), "wrote plaintext");

    Ok(output_path)
}

/// Fail before key derivation if the policy forbids replacing an existing
/// output. Runs after the source was read, so a missing source is reported
/// as such. The final rename re-checks this atomically.
fn check_output_policy(output_path: &Path, policy: OverwritePolicy) -> Result<()> {
    if policy == OverwritePolicy::FailIfExists && matches!(output_path.try_exists(), Ok(true)) {
        return Err(output_exists(output_path));
    }
    Ok(())
}

/// Write `contents` to `path` via a temporary file in the same directory.
///
/// Either the previous file (if any) or the complete new file exists at
/// `path`, never a partial one. The temporary file is removed on failure.
fn write_file_atomic(path: &Path, contents: &[u8], policy: OverwritePolicy) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::Builder::new()
        .prefix(".smaicrypt-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            SmaiError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to create tempfile in {}", dir.display()),
                e,
            )
        })?;

    temp_file
        .write_all(contents)
        .map_err(|e| partial_write("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| partial_write("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| partial_write("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| partial_write("failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| partial_write("failed to set tempfile permissions", e))?;
    }

    let persisted = match policy {
        OverwritePolicy::Overwrite => temp_file.persist(path),
        OverwritePolicy::FailIfExists => temp_file.persist_noclobber(path),
    };
    persisted.map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            output_exists(path)
        } else {
            partial_write(
                format!("failed to rename to target file {}", path.display()),
                e.error,
            )
        }
    })?;
    Ok(())
}

fn partial_write(msg: impl Into<String>, err: io::Error) -> SmaiError {
    SmaiError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::PartialWrite, msg, err)
}

fn output_exists(path: &Path) -> SmaiError {
    SmaiError::with_kind(
        ErrorCategory::User,
        ErrorKind::OutputExists,
        format!("{} already exists", path.display()),
    )
}

fn read_error(path: &Path, err: io::Error) -> SmaiError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    SmaiError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::kdf::SALT_LEN;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    /// Names of all entries in `dir`, sorted.
    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");

        let plaintext = b"hello world";
        fs::write(&plain_path, plaintext).unwrap();

        let crypt_path = encrypt_file(&plain_path, "correct horse").unwrap();
        assert_eq!(crypt_path, temp_dir.path().join("plain.txt.smai"));

        let container = fs::read(&crypt_path).unwrap();
        assert!(container.len() >= SALT_LEN + plaintext.len());

        fs::remove_file(&plain_path).unwrap();
        let decrypted_path = decrypt_file(&crypt_path, "correct horse").unwrap();
        assert_eq!(decrypted_path, plain_path);
        assert_eq!(fs::read(&decrypted_path).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_wrong_password() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"hello world").unwrap();

        let crypt_path = encrypt_file(&plain_path, "correct horse").unwrap();
        fs::remove_file(&plain_path).unwrap();

        let err = decrypt_file(&crypt_path, "wrong password")
            .expect_err("expected authentication failure");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert!(!plain_path.exists());
        assert_eq!(dir_entries(temp_dir.path()), vec!["plain.txt.smai"]);
    }

    #[test]
    fn test_encrypting_twice_differs() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"same content").unwrap();

        let crypt_path = encrypt_file(&plain_path, "pw").unwrap();
        let first = fs::read(&crypt_path).unwrap();
        encrypt_file(&plain_path, "pw").unwrap();
        let second = fs::read(&crypt_path).unwrap();

        assert_ne!(first[..SALT_LEN], second[..SALT_LEN]);
        assert_ne!(first[SALT_LEN..], second[SALT_LEN..]);
    }

    #[test]
    fn test_tampered_container() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"important").unwrap();

        let crypt_path = encrypt_file(&plain_path, "pw").unwrap();
        let mut container = fs::read(&crypt_path).unwrap();
        let last = container.len() - 1;
        container[last] ^= 0x80;
        fs::write(&crypt_path, &container).unwrap();

        let err = decrypt_file(&crypt_path, "pw").expect_err("expected authentication failure");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert_eq!(fs::read(&plain_path).unwrap(), b"important");
    }

    #[test]
    fn test_decrypt_requires_extension() {
        // The file does not exist, so any I/O would surface as an Io error.
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.txt");

        let err = decrypt_file(&path, "pw").expect_err("expected rejection");
        assert_eq!(err.kind, Some(ErrorKind::MalformedContainer));
        assert!(dir_entries(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_decrypt_short_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.txt.smai");
        fs::write(&path, [0u8; SALT_LEN - 1]).unwrap();

        let err = decrypt_file(&path, "pw").expect_err("expected malformed container");
        assert_eq!(err.kind, Some(ErrorKind::MalformedContainer));
        assert!(!temp_dir.path().join("short.txt").exists());
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.txt");

        let err = encrypt_file(&path, "pw").expect_err("expected read failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(err.category, ErrorCategory::User);
        assert!(dir_entries(temp_dir.path()).is_empty());

        let err = decrypt_file(&encrypted_path(&path), "pw").expect_err("expected read failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("empty.txt");
        fs::write(&plain_path, b"").unwrap();

        let crypt_path = encrypt_file(&plain_path, "test").unwrap();
        fs::remove_file(&plain_path).unwrap();
        decrypt_file(&crypt_path, "test").unwrap();

        assert_eq!(fs::read(&plain_path).unwrap(), b"");
    }

    #[test]
    fn test_only_trailing_extension_removed() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("archive.tar.gz");
        fs::write(&plain_path, b"not really gzip").unwrap();

        let crypt_path = encrypt_file(&plain_path, "pw").unwrap();
        assert_eq!(crypt_path, temp_dir.path().join("archive.tar.gz.smai"));

        fs::remove_file(&plain_path).unwrap();
        assert_eq!(decrypt_file(&crypt_path, "pw").unwrap(), plain_path);
    }

    #[test]
    fn test_overwrite_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"fresh").unwrap();
        let crypt_path = encrypted_path(&plain_path);
        fs::write(&crypt_path, b"stale").unwrap();

        encrypt_file(&plain_path, "pw").unwrap();
        fs::write(&plain_path, b"stale").unwrap();
        decrypt_file(&crypt_path, "pw").unwrap();

        assert_eq!(fs::read(&plain_path).unwrap(), b"fresh");
    }

    #[test]
    fn test_fail_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"content").unwrap();
        let options = Options {
            overwrite: OverwritePolicy::FailIfExists,
        };

        let crypt_path = encrypt_file_with_options(&plain_path, "pw", &options).unwrap();
        let container = fs::read(&crypt_path).unwrap();

        let err = encrypt_file_with_options(&plain_path, "pw", &options)
            .expect_err("expected existing output");
        assert_eq!(err.kind, Some(ErrorKind::OutputExists));
        assert_eq!(fs::read(&crypt_path).unwrap(), container);

        let err = decrypt_file_with_options(&crypt_path, "pw", &options)
            .expect_err("expected existing output");
        assert_eq!(err.kind, Some(ErrorKind::OutputExists));
        assert_eq!(fs::read(&plain_path).unwrap(), b"content");

        assert_eq!(dir_entries(temp_dir.path()), vec!["plain.txt", "plain.txt.smai"]);
    }

    #[test]
    fn test_fail_if_exists_reports_missing_source_first() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("gone.txt");
        fs::write(encrypted_path(&plain_path), b"existing").unwrap();
        let options = Options {
            overwrite: OverwritePolicy::FailIfExists,
        };

        let err = encrypt_file_with_options(&plain_path, "pw", &options)
            .expect_err("expected read failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));

        fs::write(&plain_path, b"existing").unwrap();
        fs::remove_file(encrypted_path(&plain_path)).unwrap();
        let err = decrypt_file_with_options(&encrypted_path(&plain_path), "pw", &options)
            .expect_err("expected read failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));
    }

    #[test]
    fn test_failed_rename_leaves_no_tempfile() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"content").unwrap();

        // A non-empty directory cannot be replaced by a file.
        let crypt_path = encrypted_path(&plain_path);
        fs::create_dir(&crypt_path).unwrap();
        fs::write(crypt_path.join("keep"), b"").unwrap();

        let err = encrypt_file(&plain_path, "pw").expect_err("expected rename failure");
        assert_eq!(err.kind, Some(ErrorKind::PartialWrite));
        assert_eq!(dir_entries(temp_dir.path()), vec!["plain.txt", "plain.txt.smai"]);
        assert_eq!(dir_entries(&crypt_path), vec!["keep"]);
    }

    #[test]
    fn test_atomic_write_no_clobber() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.bin");
        fs::write(&path, b"old").unwrap();

        let err = write_file_atomic(&path, b"new", OverwritePolicy::FailIfExists)
            .expect_err("expected existing output");
        assert_eq!(err.kind, Some(ErrorKind::OutputExists));
        assert_eq!(fs::read(&path).unwrap(), b"old");
        assert_eq!(dir_entries(temp_dir.path()), vec!["out.bin"]);

        write_file_atomic(&path, b"new", OverwritePolicy::Overwrite).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(dir_entries(temp_dir.path()), vec!["out.bin"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"test").unwrap();

        let crypt_path = encrypt_file(&plain_path, "test").unwrap();
        let mode = fs::metadata(&crypt_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        fs::remove_file(&plain_path).unwrap();
        decrypt_file(&crypt_path, "test").unwrap();
        let mode = fs::metadata(&plain_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_concurrent_operations_on_different_files() {
        let temp_dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| {
                let path = temp_dir.path().join(format!("file{}.bin", i));
                fs::write(&path, vec![i as u8; 1000 + i]).unwrap();
                path
            })
            .collect();

        std::thread::scope(|scope| {
            for path in &paths {
                scope.spawn(move || {
                    let crypt_path = encrypt_file(path, "shared password").unwrap();
                    fs::remove_file(path).unwrap();
                    decrypt_file(&crypt_path, "shared password").unwrap();
                });
            }
        });

        for (i, path) in paths.iter().enumerate() {
            assert_eq!(fs::read(path).unwrap(), vec![i as u8; 1000 + i]);
        }
    }

    #[test]
    fn test_decrypted_path() {
        assert_eq!(
            decrypted_path(Path::new("dir/name.ext.smai")),
            Some(PathBuf::from("dir/name.ext"))
        );
        assert_eq!(
            decrypted_path(Path::new("name.smai")),
            Some(PathBuf::from("name"))
        );
        assert_eq!(decrypted_path(Path::new("name.txt")), None);
        assert_eq!(decrypted_path(Path::new("name.SMAI")), None);
        assert_eq!(decrypted_path(Path::new("name.smai.txt")), None);
        assert_eq!(decrypted_path(Path::new(".smai")), None);
        assert_eq!(decrypted_path(Path::new("dir/..smai")), None);
    }

    #[test]
    fn test_encrypted_path() {
        assert_eq!(
            encrypted_path(Path::new("dir/name.ext")),
            PathBuf::from("dir/name.ext.smai")
        );
        assert_eq!(encrypted_path(Path::new("name")), PathBuf::from("name.smai"));
    }
}
