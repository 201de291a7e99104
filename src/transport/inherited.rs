//! Inherited-descriptor transport
//!
//! Wraps descriptors that were already open when this process started,
//! typically stdio set up by an embedder that spawned us.

use super::{ByteChannel, TransportKind};

#[cfg(unix)]
use crate::common::{Error, Result};

/// This process's stdin/stdout as a channel
pub fn stdio() -> ByteChannel {
    ByteChannel::new(tokio::io::stdin(), tokio::io::stdout(), TransportKind::Inherited)
}

/// Wrap an arbitrary inherited descriptor pair
#[cfg(unix)]
pub fn from_fds(read_fd: std::os::fd::OwnedFd, write_fd: std::os::fd::OwnedFd) -> ByteChannel {
    let reader = tokio::fs::File::from_std(std::fs::File::from(read_fd));
    let writer = tokio::fs::File::from_std(std::fs::File::from(write_fd));
    ByteChannel::new(reader, writer, TransportKind::Inherited)
}

/// Read everything from an inherited descriptor number
///
/// Used for input text handed over by the launcher (`--input-fd`).
#[cfg(unix)]
pub fn read_fd_to_string(fd: std::os::fd::RawFd) -> Result<String> {
    use std::io::Read;
    use std::os::fd::FromRawFd;

    if fd < 0 {
        return Err(Error::invalid_args(format!("invalid descriptor {}", fd)));
    }
    // fcntl(F_GETFD) fails for descriptors that are not open
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(Error::FileRead {
            path: format!("fd {}", fd),
            error: std::io::Error::last_os_error().to_string(),
        });
    }

    // SAFETY: the descriptor is open and ownership passes to the File,
    // which closes it when done
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|e| Error::FileRead {
        path: format!("fd {}", fd),
        error: e.to_string(),
    })?;
    Ok(text)
}
