//! Mounting attached block devices and overlays.

mod opts;

pub use opts::{parse_options, MountOptionConfig};

use std::path::Path;

use nix::mount::{MntFlags, MsFlags};

use crate::syscall::{Syscall, SyscallError};
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("no file system type provided for {0:?}")]
    NoFsType(std::path::PathBuf),
    #[error("failed to create directory {path:?}")]
    CreateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed syscall")]
    Syscall(#[from] SyscallError),
}

type Result<T> = std::result::Result<T, MountError>;

/// Mounts `dev` on `path`, splitting `options` into flags and data.
pub fn mount_device<S: AsRef<str>>(
    syscall: &dyn Syscall,
    dev: &Path,
    path: &Path,
    fstype: &str,
    options: &[S],
) -> Result<()> {
    if fstype.is_empty() {
        return Err(MountError::NoFsType(path.to_path_buf()));
    }

    let config = parse_options(options);
    let data = (!config.data.is_empty()).then_some(config.data.as_str());
    tracing::debug!(?dev, ?path, fstype, flags = ?config.flags, data, "mounting device");
    syscall.mount(Some(dev), path, Some(fstype), config.flags, data)?;
    Ok(())
}

/// Mounts a writable overlay on `dest` on top of an already mounted
/// `lower`. Upper and work have to live on the same filesystem.
pub fn overlay(
    syscall: &dyn Syscall,
    lower: &Path,
    upper: &Path,
    work: &Path,
    dest: &Path,
) -> Result<()> {
    for dir in [upper, work, dest] {
        utils::create_dir_all(dir).map_err(|err| MountError::CreateDir {
            path: dir.to_path_buf(),
            source: err,
        })?;
    }

    let options = [
        format!("lowerdir={}", lower.display()),
        format!("upperdir={}", upper.display()),
        format!("workdir={}", work.display()),
    ];
    mount_device(syscall, Path::new("overlay"), dest, "overlay", &options)
}

pub fn unmount(syscall: &dyn Syscall, path: &Path, force: bool, lazy: bool) -> Result<()> {
    let mut flags = MntFlags::empty();
    if force {
        flags |= MntFlags::MNT_FORCE;
    }
    if lazy {
        flags |= MntFlags::MNT_DETACH;
    }
    syscall.umount2(path, flags)?;
    Ok(())
}

/// Bind mounts a directory onto itself so that it becomes a mount point.
pub fn bind_self(syscall: &dyn Syscall, path: &Path) -> Result<()> {
    syscall.mount(Some(path), path, None, MsFlags::MS_BIND, None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::{MountArgs, TestHelperSyscall};
    use crate::syscall::create_syscall;
    use anyhow::Result;
    use std::path::PathBuf;

    #[test]
    fn test_mount_device() -> Result<()> {
        let syscall = create_syscall();
        mount_device(
            syscall.as_ref(),
            Path::new("/dev/rbd0"),
            Path::new("/newroot"),
            "ext4",
            &["ro", "discard"],
        )?;
        let got = syscall
            .as_any()
            .downcast_ref::<TestHelperSyscall>()
            .unwrap()
            .get_mount_args();
        assert_eq!(
            got,
            vec![MountArgs {
                source: Some(PathBuf::from("/dev/rbd0")),
                target: PathBuf::from("/newroot"),
                fstype: Some("ext4".to_string()),
                flags: MsFlags::MS_RDONLY,
                data: Some("discard".to_string()),
            }]
        );
        Ok(())
    }

    #[test]
    fn test_mount_device_requires_fstype() {
        let syscall = create_syscall();
        let res = mount_device::<&str>(
            syscall.as_ref(),
            Path::new("/dev/rbd0"),
            Path::new("/newroot"),
            "",
            &[],
        );
        assert!(matches!(res, Err(MountError::NoFsType(_))));
    }

    #[test]
    fn test_overlay() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let lower = tmp.path().join("lower");
        let upper = tmp.path().join("rw/upper");
        let work = tmp.path().join("rw/work");
        let dest = tmp.path().join("root");
        let syscall = create_syscall();

        overlay(syscall.as_ref(), &lower, &upper, &work, &dest)?;

        assert!(upper.is_dir() && work.is_dir() && dest.is_dir());
        let got = syscall
            .as_any()
            .downcast_ref::<TestHelperSyscall>()
            .unwrap()
            .get_mount_args();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].fstype.as_deref(), Some("overlay"));
        assert_eq!(got[0].target, dest);
        assert_eq!(
            got[0].data,
            Some(format!(
                "lowerdir={},upperdir={},workdir={}",
                lower.display(),
                upper.display(),
                work.display()
            ))
        );
        Ok(())
    }

    #[test]
    fn test_unmount_flags() -> Result<()> {
        let syscall = create_syscall();
        unmount(syscall.as_ref(), Path::new("/mnt"), true, true)?;
        let calls = syscall
            .as_any()
            .downcast_ref::<TestHelperSyscall>()
            .unwrap()
            .get_calls();
        assert_eq!(
            calls,
            vec![crate::syscall::test::Call::Umount2(
                PathBuf::from("/mnt"),
                MntFlags::MNT_FORCE | MntFlags::MNT_DETACH
            )]
        );
        Ok(())
    }
}
