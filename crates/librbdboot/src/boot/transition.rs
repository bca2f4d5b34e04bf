use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use nix::mount::{MntFlags, MsFlags};
use nix::sched::CloneFlags;

use super::cleanup;
use super::validate::{validate_image, validate_init};
use super::{Phase, Result, TransitionError};
use crate::syscall::{create_syscall, Syscall, SyscallError};
use crate::utils::{self, PathBufExt};

/// Mounts carried over from the old root into the new one.
pub const SPECIAL_MOUNTS: [&str; 4] = ["/dev", "/proc", "/sys", "/run"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootMode {
    /// Replace the whole system root and exec init in place.
    SwitchRoot,
    /// Start init in new mount and PID namespaces, like a container.
    Namespaced,
}

/// Makes an already mounted directory the root of the process and starts
/// init inside it.
///
/// There is no concurrency control here: the process root and mount table
/// are process wide, and a boot makes exactly one transition attempt. Steps
/// are not rolled back, so a failure while moving the root leaves any special
/// mounts that were already moved where they are.
pub struct RootTransition {
    new_root: PathBuf,
    init: PathBuf,
    mode: RootMode,
    syscall: Box<dyn Syscall>,
}

impl RootTransition {
    pub fn new<P: Into<PathBuf>, I: Into<PathBuf>>(new_root: P, init: I, mode: RootMode) -> Self {
        Self {
            new_root: new_root.into(),
            init: init.into(),
            mode,
            syscall: create_syscall(),
        }
    }

    pub fn with_syscall(mut self, syscall: Box<dyn Syscall>) -> Self {
        self.syscall = syscall;
        self
    }

    pub fn new_root(&self) -> &Path {
        &self.new_root
    }

    pub fn init(&self) -> &Path {
        &self.init
    }

    pub fn mode(&self) -> RootMode {
        self.mode
    }

    #[cfg(test)]
    pub(crate) fn syscall(&self) -> &dyn Syscall {
        self.syscall.as_ref()
    }

    fn enter(&self, phase: Phase) {
        tracing::debug!(%phase, new_root = ?self.new_root, init = ?self.init, "root transition");
    }

    /// Runs the transition for the configured mode. In switch root mode
    /// this only returns on failure.
    pub fn run(&self) -> Result<ExitStatus> {
        match self.mode {
            RootMode::SwitchRoot => match self.switch_root()? {},
            RootMode::Namespaced => self.unshare_root(),
        }
    }

    /// Moves the system onto the new root, reclaims the old root if it was
    /// a ramdisk and replaces the current process with init.
    pub fn switch_root(&self) -> Result<Infallible> {
        self.validate(false)?;

        let old_root = utils::open("/").map_err(|source| TransitionError::Io {
            phase: Phase::MovingRoot,
            path: PathBuf::from("/"),
            source,
        })?;
        self.move_root()?;

        self.enter(Phase::CleaningOldRoot);
        cleanup::clean_old_root(old_root);

        self.exec_init()
    }

    /// Moves the new root into fresh mount and PID namespaces and runs init
    /// as the first process of the new PID namespace, waiting for it to exit.
    pub fn unshare_root(&self) -> Result<ExitStatus> {
        self.validate(true)?;

        self.enter(Phase::Unsharing);
        self.syscall
            .unshare(CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID)
            .map_err(|source| TransitionError::Syscall {
                phase: Phase::Unsharing,
                source,
            })?;

        self.move_root()?;

        self.enter(Phase::ExecingInit);
        let status = self
            .syscall
            .spawn_wait(&self.init)
            .map_err(|source| self.exec_failed(source))?;
        tracing::info!(?status, init = ?self.init, "init exited");
        Ok(status)
    }

    fn validate(&self, bind_bare: bool) -> Result<()> {
        self.enter(Phase::ValidatingImage);
        validate_image(self.syscall.as_ref(), &self.new_root, bind_bare)?;
        self.enter(Phase::ValidatingInit);
        validate_init(self.syscall.as_ref(), &self.new_root, &self.init)?;
        Ok(())
    }

    /// Moves one special mount below the new root. Failures are returned
    /// to be logged, the caller carries on regardless.
    fn move_mount(&self, mount: &Path) -> Result<()> {
        let phase = Phase::MovingRoot;
        let relative = mount
            .as_relative()
            .map_err(|err| TransitionError::validation(phase, err.to_string()))?;
        let target = self.new_root.join(relative);

        if !utils::is_mountpoint(mount) {
            return Err(TransitionError::validation(
                phase,
                format!("{mount:?} is not a mount point"),
            ));
        }

        if utils::is_mountpoint(&target) {
            let _ = self.syscall.umount2(mount, MntFlags::MNT_DETACH);
            return Err(TransitionError::validation(
                phase,
                format!("{target:?} is already mounted, detached {mount:?}"),
            ));
        }

        if let Err(err) = self
            .syscall
            .mount(Some(mount), &target, None, MsFlags::MS_MOVE, None)
        {
            let _ = self.syscall.umount2(mount, MntFlags::MNT_FORCE);
            return Err(TransitionError::MountMoveFailed {
                phase,
                source_path: mount.to_path_buf(),
                target,
                err,
            });
        }
        Ok(())
    }

    fn move_root(&self) -> Result<()> {
        let phase = Phase::MovingRoot;
        self.enter(phase);

        for mount in SPECIAL_MOUNTS {
            if let Err(err) = self.move_mount(Path::new(mount)) {
                tracing::warn!(%err, mount, "could not move special mount");
            }
        }

        self.syscall
            .chdir(&self.new_root)
            .map_err(|source| TransitionError::Syscall { phase, source })?;

        let root = Path::new("/");
        self.syscall
            .mount(Some(&self.new_root), root, None, MsFlags::MS_MOVE, None)
            .map_err(|err| {
                tracing::error!(?err, new_root = ?self.new_root, "failed to move new root to /");
                TransitionError::MountMoveFailed {
                    phase,
                    source_path: self.new_root.clone(),
                    target: root.to_path_buf(),
                    err,
                }
            })?;

        self.syscall
            .chroot(Path::new("."))
            .map_err(|source| TransitionError::Syscall { phase, source })?;
        Ok(())
    }

    /// Replaces the process with init, `argv` holding only the init path and
    /// an empty environment.
    fn exec_init(&self) -> Result<Infallible> {
        self.enter(Phase::ExecingInit);
        let arg0 = CString::new(self.init.as_os_str().as_bytes()).map_err(|_| {
            TransitionError::validation(Phase::ExecingInit, format!("init {:?} contains a nul byte", self.init))
        })?;

        match self.syscall.execve(&self.init, &[arg0], &[]) {
            Ok(never) => match never {},
            Err(source) => {
                tracing::error!(err = %source, init = ?self.init, "exec of init failed, root already switched");
                Err(self.exec_failed(source))
            }
        }
    }

    fn exec_failed(&self, source: SyscallError) -> TransitionError {
        TransitionError::ExecFailed {
            phase: Phase::ExecingInit,
            init: self.init.clone(),
            source,
        }
    }
}
