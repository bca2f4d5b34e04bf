//! Best-effort reclaim of a ramdisk root after it has been replaced.

use std::ffi::CString;
use std::fs::File;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

use nix::dir::Dir;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::{self, Mode};
use nix::sys::statfs::{self, FsType, TMPFS_MAGIC};
use nix::unistd::{self, UnlinkatFlags};

const RAMFS_MAGIC: FsType = FsType(0x8584_58f6);

fn is_ramdisk_type(fs_type: FsType) -> bool {
    fs_type == TMPFS_MAGIC || fs_type == RAMFS_MAGIC
}

/// Whether the filesystem holding `dir` lives in memory. Any failure to
/// tell is treated as "not a ramdisk".
pub fn is_ramdisk(dir: &File) -> bool {
    match statfs::fstatfs(dir) {
        Ok(stat) => is_ramdisk_type(stat.filesystem_type()),
        Err(err) => {
            tracing::warn!(?err, "failed to statfs old root");
            false
        }
    }
}

/// Deletes the contents of the old root if it is a ramdisk. Never fails,
/// problems are logged and skipped.
pub fn clean_old_root(old_root: File) {
    if !is_ramdisk(&old_root) {
        tracing::debug!("old root is not a ramdisk, leaving it alone");
        return;
    }

    let dev = match stat::fstat(old_root.as_raw_fd()) {
        Ok(stat) => stat.st_dev,
        Err(err) => {
            tracing::warn!(?err, "failed to stat old root");
            return;
        }
    };
    recursive_delete(old_root, dev);
}

/// Removes everything below `dir` without following symlinks and without
/// descending into directories whose device differs from `root_dev`. Those
/// are mount points and are left untouched along with their contents.
pub fn recursive_delete(dir: File, root_dev: u64) {
    match Dir::from_fd(dir.into_raw_fd()) {
        Ok(mut dir) => delete_entries(&mut dir, root_dev),
        Err(err) => tracing::warn!(?err, "failed to read directory"),
    }
}

fn delete_entries(dir: &mut Dir, root_dev: u64) {
    let fd = dir.as_raw_fd();
    let names: Vec<CString> = dir
        .iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.file_name().to_owned()),
            Err(err) => {
                tracing::warn!(?err, "failed to read directory entry");
                None
            }
        })
        .filter(|name| !matches!(name.to_bytes(), b"." | b".."))
        .collect();

    for name in names {
        delete_entry(fd, &name, root_dev);
    }
}

fn delete_entry(parent: RawFd, name: &CString, root_dev: u64) {
    let flags = OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC;
    let child = match fcntl::openat(Some(parent), name.as_c_str(), flags, Mode::empty()) {
        Ok(child) => child,
        Err(_) => {
            // not a directory, or a symlink to one
            if let Err(err) = unistd::unlinkat(Some(parent), name.as_c_str(), UnlinkatFlags::NoRemoveDir) {
                tracing::warn!(?name, ?err, "unable to remove file");
            }
            return;
        }
    };

    // Dir takes ownership of the descriptor and closes it on drop.
    let mut child = match Dir::from_fd(child) {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(?name, ?err, "failed to read directory");
            return;
        }
    };

    match stat::fstat(child.as_raw_fd()) {
        Ok(stat) if stat.st_dev == root_dev => {}
        Ok(_) => {
            tracing::debug!(?name, "skipping mount point");
            return;
        }
        Err(err) => {
            tracing::warn!(?name, ?err, "failed to stat directory");
            return;
        }
    }

    delete_entries(&mut child, root_dev);
    drop(child);

    if let Err(err) = unistd::unlinkat(Some(parent), name.as_c_str(), UnlinkatFlags::RemoveDir) {
        tracing::warn!(?name, ?err, "unable to remove directory");
    }
}
