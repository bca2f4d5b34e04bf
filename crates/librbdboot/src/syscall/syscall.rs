//! An interface trait so that rest of librbdboot can call
//! necessary functions without having to worry about their
//! implementation details
use std::any::Any;
use std::convert::Infallible;
use std::ffi::CString;
use std::os::fd::RawFd;
use std::path::Path;
use std::process::ExitStatus;

use nix::mount::{MntFlags, MsFlags};
use nix::sched::CloneFlags;

use crate::syscall::linux::LinuxSyscall;
use crate::syscall::test::TestHelperSyscall;
use crate::syscall::Result;

/// This specifies the kernel functionalities that mutate process or
/// machine wide state while attaching images and moving the root
pub trait Syscall {
    fn as_any(&self) -> &dyn Any;
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;
    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<()>;
    fn unshare(&self, flags: CloneFlags) -> Result<()>;
    fn chroot(&self, path: &Path) -> Result<()>;
    fn chdir(&self, path: &Path) -> Result<()>;
    fn fchdir(&self, fd: RawFd) -> Result<()>;
    fn execve(&self, path: &Path, args: &[CString], envs: &[CString]) -> Result<Infallible>;
    fn spawn_wait(&self, path: &Path) -> Result<ExitStatus>;
}

#[derive(Clone, Copy)]
pub enum SyscallType {
    Linux,
    Test,
}

impl Default for SyscallType {
    fn default() -> Self {
        if cfg!(test) {
            SyscallType::Test
        } else {
            SyscallType::Linux
        }
    }
}

impl SyscallType {
    pub fn create_syscall(&self) -> Box<dyn Syscall> {
        match self {
            SyscallType::Linux => Box::new(LinuxSyscall),
            SyscallType::Test => Box::<TestHelperSyscall>::default(),
        }
    }
}

pub fn create_syscall() -> Box<dyn Syscall> {
    SyscallType::default().create_syscall()
}
