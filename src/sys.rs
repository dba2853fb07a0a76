//! Thin retry-on-interrupt wrappers over raw descriptor I/O.

use std::io;
use std::os::fd::{IntoRawFd, RawFd};

use crate::error::ShellError;

/// Create a pipe and hand back `(read, write)` as raw descriptors.
///
/// Ownership transfers to the caller's close bookkeeping; nothing here will
/// close them on drop.
pub(crate) fn pipe() -> Result<(RawFd, RawFd), ShellError> {
    let (read, write) = nix::unistd::pipe()?;
    Ok((read.into_raw_fd(), write.into_raw_fd()))
}

/// Read a descriptor to end of stream.
pub(crate) fn read_all(fd: RawFd) -> Result<String, ShellError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ShellError::Os(err));
        }
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Write a whole buffer to a descriptor.
pub(crate) fn write_all(fd: RawFd, mut buf: &[u8]) -> Result<(), ShellError> {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ShellError::Os(err));
        }
        buf = &buf[n as usize..];
    }
    Ok(())
}

/// Tests that replay a built-in through a redirect move the process's own
/// stdout around with dup2; such tests must not overlap.
#[cfg(test)]
pub(crate) fn stdio_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::close;

    #[test]
    fn pipe_round_trip() {
        let (read, write) = pipe().unwrap();
        write_all(write, b"through the pipe").unwrap();
        close(write).unwrap();
        assert_eq!(read_all(read).unwrap(), "through the pipe");
        close(read).unwrap();
    }
}
