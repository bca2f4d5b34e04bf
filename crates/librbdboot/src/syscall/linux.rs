//! Implements Syscall trait for Linux systems
use std::any::Any;
use std::convert::Infallible;
use std::ffi::CString;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::{Command, ExitStatus};

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{chdir, chroot, execve, fchdir};

use super::{Result, Syscall, SyscallError};

/// Empty structure to implement Syscall trait for
#[derive(Clone)]
pub struct LinuxSyscall;

impl LinuxSyscall {
    fn to_cstring(path: &Path) -> Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| SyscallError::InvalidPath(path.to_path_buf()))
    }
}

impl Syscall for LinuxSyscall {
    /// To enable dynamic typing,
    /// see <https://doc.rust-lang.org/std/any/index.html> for more information
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        mount(source, target, fstype, flags, data).map_err(|errno| {
            SyscallError::MountFailed {
                mount_source: source.map(|p| p.to_path_buf()),
                mount_target: target.to_path_buf(),
                fstype: fstype.map(|s| s.to_string()),
                flags,
                data: data.map(|s| s.to_string()),
                errno,
            }
        })
    }

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<()> {
        umount2(target, flags).map_err(|errno| SyscallError::UmountFailed {
            target: target.to_path_buf(),
            flags,
            errno,
        })
    }

    /// Disassociate parts of execution context
    // see https://man7.org/linux/man-pages/man2/unshare.2.html for more information
    fn unshare(&self, flags: CloneFlags) -> Result<()> {
        unshare(flags).map_err(SyscallError::UnshareFailed)
    }

    fn chroot(&self, path: &Path) -> Result<()> {
        chroot(path).map_err(|errno| SyscallError::ChrootFailed {
            path: path.to_path_buf(),
            errno,
        })
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        chdir(path).map_err(|errno| SyscallError::ChdirFailed {
            path: path.to_path_buf(),
            errno,
        })
    }

    fn fchdir(&self, fd: RawFd) -> Result<()> {
        fchdir(fd).map_err(|errno| SyscallError::FchdirFailed { fd, errno })
    }

    /// Replace the current process image. Only returns on failure.
    fn execve(&self, path: &Path, args: &[CString], envs: &[CString]) -> Result<Infallible> {
        let c_path = Self::to_cstring(path)?;
        execve(&c_path, args, envs).map_err(|errno| SyscallError::ExecFailed {
            path: path.to_path_buf(),
            errno,
        })
    }

    /// Run path as a child with an empty environment and wait for it.
    fn spawn_wait(&self, path: &Path) -> Result<ExitStatus> {
        Command::new(path)
            .env_clear()
            .status()
            .map_err(|err| SyscallError::SpawnFailed {
                path: path.to_path_buf(),
                err,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::path::Path;

    use anyhow::{bail, Result};

    use super::LinuxSyscall;
    use crate::syscall::{Syscall, SyscallError};

    #[test]
    fn test_exec_missing_binary_returns_error() -> Result<()> {
        let syscall = LinuxSyscall;
        let path = Path::new("/this/binary/does/not/exist");
        let args = [CString::new("/this/binary/does/not/exist")?];
        let envs: [CString; 0] = [];
        match syscall.execve(path, &args, &envs) {
            Err(SyscallError::ExecFailed { errno, .. }) => {
                assert_eq!(errno, nix::errno::Errno::ENOENT);
            }
            Err(err) => bail!("unexpected error: {err}"),
            Ok(never) => match never {},
        }
        Ok(())
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        let syscall = LinuxSyscall;
        let path = Path::new("/bin/with\0nul");
        let envs: [CString; 0] = [];
        let ret = syscall.execve(path, &[], &envs);
        assert!(matches!(ret, Err(SyscallError::InvalidPath(_))));
    }

    #[test]
    fn test_spawn_wait_reports_exit_status() -> Result<()> {
        let syscall = LinuxSyscall;
        for candidate in ["/bin/true", "/usr/bin/true"] {
            let path = Path::new(candidate);
            if path.exists() {
                let status = syscall.spawn_wait(path)?;
                assert!(status.success());
                return Ok(());
            }
        }
        Ok(())
    }
}
