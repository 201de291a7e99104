//! Cross-platform socket and configuration paths
//!
//! Unix/macOS: Uses Unix domain sockets at $XDG_RUNTIME_DIR or /tmp
//! Windows: Uses named pipes at \\.\pipe\embedhost-<username>

use std::io;
use std::path::{Path, PathBuf};

/// Name used for the default socket/pipe and the project directories
const APP_NAME: &str = "embedhost";

/// Get the default listen socket path
///
/// Platform-specific:
/// - Unix: `$XDG_RUNTIME_DIR/embedhost/host.sock` or `/tmp/embedhost-<uid>/host.sock`
/// - Windows: Named pipe name (handled by interprocess crate)
#[cfg(unix)]
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_NAME).join("host.sock");
    }

    // Fallback to /tmp with uid for security
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid)).join("host.sock")
}

#[cfg(windows)]
pub fn socket_path() -> PathBuf {
    let username = std::env::var("USERNAME").unwrap_or_else(|_| "default".to_string());
    PathBuf::from(format!("{}-{}", APP_NAME, username))
}

/// Default listen address as a string accepted by `ListenAddress::parse`
pub fn default_address() -> String {
    socket_path().to_string_lossy().into_owned()
}

/// Ensure the directory holding a socket exists
///
/// On Unix, a newly created directory gets mode 0700
#[cfg(unix)]
pub fn ensure_socket_dir(socket: &Path) -> io::Result<()> {
    let Some(dir) = socket.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(dir)?;
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(windows)]
pub fn ensure_socket_dir(_socket: &Path) -> io::Result<()> {
    // Named pipes don't need a directory on Windows
    Ok(())
}

/// Make way for a new listener at `socket`
///
/// Nothing there is fine. A socket nobody answers on is stale and removed.
/// A live socket or any other kind of file is left alone and reported.
#[cfg(unix)]
pub fn clear_stale_socket(socket: &Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(socket) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !metadata.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        ));
    }

    match std::os::unix::net::UnixStream::connect(socket) {
        Ok(_) => Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use")),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            tracing::debug!(path = %socket.display(), "Removing stale socket");
            std::fs::remove_file(socket)
        }
        Err(e) => Err(e),
    }
}

#[cfg(windows)]
pub fn clear_stale_socket(_socket: &Path) -> io::Result<()> {
    // Named pipes vanish with their last handle
    Ok(())
}

/// Remove our own socket file on shutdown; other file types are kept
#[cfg(unix)]
pub fn remove_socket(socket: &Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(socket) {
        Ok(metadata) if metadata.file_type().is_socket() => std::fs::remove_file(socket),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to remove a non-socket path",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(windows)]
pub fn remove_socket(_socket: &Path) -> io::Result<()> {
    // Named pipes are automatically cleaned up on Windows
    Ok(())
}

/// Get the configuration directory path
///
/// - Linux: `~/.config/embedhost/`
/// - macOS: `~/Library/Application Support/embedhost/`
/// - Windows: `%APPDATA%\embedhost\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_is_valid() {
        let path = socket_path();
        assert!(!path.as_os_str().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_socket_dir_creates_private_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let socket = tmp.path().join("nested").join("host.sock");
        ensure_socket_dir(&socket).unwrap();

        let mode = std::fs::metadata(tmp.path().join("nested"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_missing_socket_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        remove_socket(&tmp.path().join("absent.sock")).unwrap();
        clear_stale_socket(&tmp.path().join("absent.sock")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_regular_files_are_never_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let notes = tmp.path().join("notes.txt");
        std::fs::write(&notes, "keep me").unwrap();

        let err = clear_stale_socket(&notes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(remove_socket(&notes).is_err());
        assert_eq!(std::fs::read_to_string(&notes).unwrap(), "keep me");
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_socket_is_cleared_live_one_kept() {
        let tmp = tempfile::tempdir().unwrap();

        let stale = tmp.path().join("stale.sock");
        drop(std::os::unix::net::UnixListener::bind(&stale).unwrap());
        assert!(stale.exists());
        clear_stale_socket(&stale).unwrap();
        assert!(!stale.exists());

        let live = tmp.path().join("live.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&live).unwrap();
        let err = clear_stale_socket(&live).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        assert!(live.exists());
    }
}
