use std::fs;
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::{Phase, Result, TransitionError};
use crate::mount;
use crate::syscall::Syscall;
use crate::utils::{self, PathBufExt};

/// Checks that `new_root` is a directory and a mount point. With
/// `bind_bare` a plain directory is bind mounted onto itself instead. A self
/// bind keeps the device id of the parent, so the bind itself is what makes
/// it a mount point.
pub(super) fn validate_image(syscall: &dyn Syscall, new_root: &Path, bind_bare: bool) -> Result<()> {
    let phase = Phase::ValidatingImage;
    let metadata = fs::metadata(new_root).map_err(|err| {
        TransitionError::validation(phase, format!("new root {new_root:?} is not accessible: {err}"))
    })?;
    if !metadata.is_dir() {
        return Err(TransitionError::validation(
            phase,
            format!("new root {new_root:?} is not a directory"),
        ));
    }

    if utils::is_mountpoint(new_root) {
        return Ok(());
    }

    if bind_bare {
        tracing::debug!(?new_root, "bind mounting bare directory onto itself");
        return mount::bind_self(syscall, new_root).map_err(|err| match err {
            mount::MountError::Syscall(source) => TransitionError::Syscall { phase, source },
            other => TransitionError::validation(phase, other.to_string()),
        });
    }

    Err(TransitionError::validation(
        phase,
        format!("new root {new_root:?} is not a mount point"),
    ))
}

/// Resolves `init` the way it will be seen once `new_root` is `/` and
/// checks that it is an executable regular file. Returns the resolved path,
/// relative to the new root.
pub(super) fn validate_init(syscall: &dyn Syscall, new_root: &Path, init: &Path) -> Result<PathBuf> {
    let phase = Phase::ValidatingInit;
    let syscall_err = |source| TransitionError::Syscall { phase, source };

    let old_root = utils::open("/").map_err(|source| TransitionError::Io {
        phase,
        path: PathBuf::from("/"),
        source,
    })?;

    syscall.chroot(new_root).map_err(syscall_err)?;
    let resolved = syscall
        .chdir(Path::new("/"))
        .map_err(syscall_err)
        .and_then(|_| {
            fs::canonicalize(init).map_err(|err| {
                TransitionError::validation(phase, format!("init {init:?} could not be found: {err}"))
            })
        });

    // Leave the temporary chroot whether or not resolving worked.
    syscall.fchdir(old_root.as_raw_fd()).map_err(syscall_err)?;
    syscall.chroot(Path::new(".")).map_err(syscall_err)?;
    let resolved = resolved?;

    let relative = resolved
        .as_relative()
        .map_err(|err| TransitionError::validation(phase, err.to_string()))?;
    let outside = new_root.join(relative);
    let metadata = fs::metadata(&outside).map_err(|err| {
        TransitionError::validation(phase, format!("init {outside:?} could not be opened: {err}"))
    })?;
    if !metadata.is_file() {
        return Err(TransitionError::validation(
            phase,
            format!("init {outside:?} is not a regular file"),
        ));
    }
    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(TransitionError::validation(
            phase,
            format!("init {outside:?} is not executable"),
        ));
    }

    tracing::debug!(?init, ?resolved, "init validated");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::create_syscall;
    use crate::syscall::linux::LinuxSyscall;
    use crate::syscall::test::{Call, TestHelperSyscall};
    use crate::test_utils::test_in_child_process;
    use anyhow::Result;
    use nix::mount::{mount, MsFlags};
    use nix::sched::{unshare, CloneFlags};
    use serial_test::serial;
    use std::fs::File;

    fn helper(syscall: &dyn Syscall) -> &TestHelperSyscall {
        syscall.as_any().downcast_ref::<TestHelperSyscall>().unwrap()
    }

    #[test]
    fn test_validate_image_mountpoint() -> Result<()> {
        let syscall = create_syscall();
        validate_image(syscall.as_ref(), Path::new("/proc"), false)?;
        validate_image(syscall.as_ref(), Path::new("/proc"), true)?;
        assert!(helper(syscall.as_ref()).get_calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_validate_image_missing() {
        let syscall = create_syscall();
        let err = validate_image(syscall.as_ref(), Path::new("/nonexistent/newroot"), true).unwrap_err();
        assert!(matches!(err, TransitionError::ValidationFailed { .. }));
        assert_eq!(err.phase(), Phase::ValidatingImage);
        assert!(helper(syscall.as_ref()).get_calls().is_empty());
    }

    #[test]
    fn test_validate_image_file() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("file");
        File::create(&file)?;
        let syscall = create_syscall();
        assert!(validate_image(syscall.as_ref(), &file, true).is_err());
        assert!(helper(syscall.as_ref()).get_calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_validate_image_bare_directory() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let syscall = create_syscall();

        assert!(validate_image(syscall.as_ref(), tmp.path(), false).is_err());
        assert!(helper(syscall.as_ref()).get_calls().is_empty());

        validate_image(syscall.as_ref(), tmp.path(), true)?;
        let mounts = helper(syscall.as_ref()).get_mount_args();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source.as_deref(), Some(tmp.path()));
        assert_eq!(mounts[0].target, tmp.path());
        assert_eq!(mounts[0].flags, MsFlags::MS_BIND);
        Ok(())
    }

    #[test]
    fn test_validate_image_bind_failure() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let syscall = create_syscall();
        helper(syscall.as_ref()).fail_mount_on(tmp.path());

        let err = validate_image(syscall.as_ref(), tmp.path(), true).unwrap_err();
        assert!(matches!(err, TransitionError::Syscall { .. }));
        assert_eq!(err.phase(), Phase::ValidatingImage);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_validate_image_bare_directory_linux() -> Result<()> {
        if !nix::unistd::getuid().is_root() {
            return Ok(());
        }
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();

        test_in_child_process(move || {
            unshare(CloneFlags::CLONE_NEWNS).map_err(|e| e.to_string())?;
            mount(None::<&str>, "/", None::<&str>, MsFlags::MS_REC | MsFlags::MS_PRIVATE, None::<&str>)
                .map_err(|e| e.to_string())?;

            validate_image(&LinuxSyscall, &root, true).map_err(|e| e.to_string())?;

            let mountinfo = fs::read_to_string("/proc/self/mountinfo").map_err(|e| e.to_string())?;
            let target = root.to_string_lossy();
            if !mountinfo.lines().any(|l| l.split(' ').nth(4) == Some(target.as_ref())) {
                return Err(format!("{target} missing from mountinfo").into());
            }
            Ok(())
        })?;
        Ok(())
    }

    #[test]
    fn test_validate_init() -> Result<()> {
        let exe = std::env::current_exe()?;
        let syscall = create_syscall();
        let resolved = validate_init(syscall.as_ref(), Path::new("/"), &exe)?;
        assert_eq!(resolved, fs::canonicalize(&exe)?);

        let calls = helper(syscall.as_ref()).get_calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], Call::Chroot(PathBuf::from("/")));
        assert_eq!(calls[1], Call::Chdir(PathBuf::from("/")));
        assert!(matches!(calls[2], Call::Fchdir(_)));
        assert_eq!(calls[3], Call::Chroot(PathBuf::from(".")));
        Ok(())
    }

    #[test]
    fn test_validate_init_missing_restores_root() {
        let syscall = create_syscall();
        let err = validate_init(syscall.as_ref(), Path::new("/"), Path::new("/nonexistent/init"))
            .unwrap_err();
        assert_eq!(err.phase(), Phase::ValidatingInit);
        assert_eq!(
            helper(syscall.as_ref()).get_chroot_args(),
            vec![PathBuf::from("/"), PathBuf::from(".")]
        );
    }

    #[test]
    fn test_validate_init_not_executable() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let init = tmp.path().join("init");
        fs::write(&init, "#!/bin/sh\n")?;
        fs::set_permissions(&init, fs::Permissions::from_mode(0o644))?;
        let syscall = create_syscall();

        let err = validate_init(syscall.as_ref(), Path::new("/"), &init).unwrap_err();
        assert!(err.to_string().contains("not executable"));

        let err = validate_init(syscall.as_ref(), Path::new("/"), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
        Ok(())
    }
}
