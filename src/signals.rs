//! Thin libc wrappers for preempting and reaping managed-task children,
//! with EINTR-retry around `kill`/`waitpid`.
//!
//! There is no controlling terminal here — managed tasks are single
//! `/bin/sh -c` children, signalled directly by pid, never by process
//! group.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::{FromRawFd, RawFd};

/// `kill(pid, SIGSTOP)`, retried across `EINTR`. No-op safety contract:
/// callers must never pass pid 0 (a `TaskRecord` with no child uses 0 as
/// its "not yet started" sentinel; this wrapper rejects it rather than
/// signalling the whole process group by accident).
pub fn stop(pid: libc::pid_t) -> io::Result<()> {
    send(pid, libc::SIGSTOP)
}

/// `kill(pid, SIGCONT)`, retried across `EINTR`.
pub fn cont(pid: libc::pid_t) -> io::Result<()> {
    send(pid, libc::SIGCONT)
}

/// `kill(pid, SIGKILL)`, retried across `EINTR`.
pub fn kill(pid: libc::pid_t) -> io::Result<()> {
    send(pid, libc::SIGKILL)
}

fn send(pid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to signal pid <= 0",
        ));
    }
    loop {
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already reaped; best-effort callers can proceed.
            Some(code) if code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Reap a pid without requiring it to be stopped/exited yet; used at
/// RETIRE after the capture pipe has already produced EOF, so the child
/// is expected to be exiting or already a zombie.
pub fn reap(pid: libc::pid_t) {
    let mut raw_status: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if rc >= 0 {
            return;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        // ECHILD: already reaped by someone else (e.g. cancellation raced
        // RETIRE). Nothing left to do.
        return;
    }
}

/// Mark a raw fd non-blocking via `fcntl(F_SETFL, O_NONBLOCK)`. Used once
/// on a task's `capture_read` fd right after SPAWN so the scheduler's
/// per-tick reads never block waiting on child output.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Bind and listen on `addr` with an explicit `backlog`.
/// `std::net::TcpListener::bind` has no way to request a backlog
/// narrower than the OS default, so this goes straight to
/// `socket`/`bind`/`listen` and hands the resulting fd to
/// `TcpListener` once `listen(2)` has set the backlog we want.
pub fn bind_with_backlog(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let SocketAddr::V4(addr_v4) = addr else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "only IPv4 addresses are supported",
        ));
    };

    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let reuse: libc::c_int = 1;
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &reuse as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );

        let mut sockaddr: libc::sockaddr_in = std::mem::zeroed();
        sockaddr.sin_family = libc::AF_INET as libc::sa_family_t;
        sockaddr.sin_port = addr_v4.port().to_be();
        sockaddr.sin_addr.s_addr = u32::from_ne_bytes(addr_v4.ip().octets());

        let rc = libc::bind(
            fd,
            &sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        );
        if rc != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        if libc::listen(fd, backlog) != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(TcpListener::from_raw_fd(fd))
    }
}
