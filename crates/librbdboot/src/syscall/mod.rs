//! Contains a wrapper of syscalls for unit tests
//! This provides a uniform interface for the rest of librbdboot
//! to call the syscalls required to attach images and switch roots

pub mod linux;
#[allow(clippy::module_inception)]
pub mod syscall;

pub use syscall::{create_syscall, Syscall};

#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    #[error("mount of {mount_target:?} failed: {errno}")]
    MountFailed {
        mount_source: Option<std::path::PathBuf>,
        mount_target: std::path::PathBuf,
        fstype: Option<String>,
        flags: nix::mount::MsFlags,
        data: Option<String>,
        errno: nix::errno::Errno,
    },
    #[error("umount of {target:?} failed: {errno}")]
    UmountFailed {
        target: std::path::PathBuf,
        flags: nix::mount::MntFlags,
        errno: nix::errno::Errno,
    },
    #[error("failed to unshare: {0}")]
    UnshareFailed(nix::errno::Errno),
    #[error("failed to chroot to {path:?}: {errno}")]
    ChrootFailed {
        path: std::path::PathBuf,
        errno: nix::errno::Errno,
    },
    #[error("failed to chdir to {path:?}: {errno}")]
    ChdirFailed {
        path: std::path::PathBuf,
        errno: nix::errno::Errno,
    },
    #[error("failed to fchdir to fd {fd}: {errno}")]
    FchdirFailed {
        fd: std::os::fd::RawFd,
        errno: nix::errno::Errno,
    },
    #[error("failed to exec {path:?}: {errno}")]
    ExecFailed {
        path: std::path::PathBuf,
        errno: nix::errno::Errno,
    },
    #[error("failed to spawn {path:?}: {err}")]
    SpawnFailed {
        path: std::path::PathBuf,
        err: std::io::Error,
    },
    #[error("invalid path {0:?}: contains a nul byte")]
    InvalidPath(std::path::PathBuf),
}

type Result<T> = std::result::Result<T, SyscallError>;
