use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use super::{RootMode, RootTransition, TransitionError};
use crate::cmdline::{self, CmdlineError, MountSpec, DEFAULT_CMDLINE_PATH};
use crate::krbd::{DeviceQuery, KrbdBus, KrbdError, DEFAULT_SYS_BUS_PATH};
use crate::mount::{self, MountError};
use crate::syscall::{create_syscall, Syscall};
use crate::utils::{self, PathBufExt};

/// Name of the mount spec that becomes the new system root.
pub const ROOT_MOUNT: &str = "root";
/// Where images are mounted and what init is started from.
pub const DEFAULT_ROOT_PATH: &str = "/newroot";
/// Holds the `lower`, `upper` and `work` directories of a root overlay.
pub const DEFAULT_OVERLAY_PATH: &str = "/run/overlayfs";

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("failed to read kernel command line")]
    Cmdline(#[from] CmdlineError),
    #[error("root mount path must be \"/\", got {0:?}")]
    RootPath(String),
    #[error("mount {0} has no image")]
    MissingImage(String),
    #[error("mount {name} path {path:?} must be absolute")]
    InvalidPath { name: String, path: String },
    #[error("mount {name}: rbd device")]
    Krbd {
        name: String,
        #[source]
        source: KrbdError,
    },
    #[error("failed to create {path:?}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("mount {name}: failed to mount")]
    Mount {
        name: String,
        #[source]
        source: MountError,
    },
    #[error("root transition failed")]
    Transition(#[from] TransitionError),
}

type Result<T> = std::result::Result<T, BootError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    pub mode: RootMode,
    pub init: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    pub cmdline_path: PathBuf,
    pub sys_bus_path: PathBuf,
    pub root_path: PathBuf,
    pub overlay_path: PathBuf,
    /// Create missing mount points.
    pub mkdir: bool,
    /// Log every action instead of performing it.
    pub noop: bool,
    /// What to do once the root is mounted, if anything.
    pub init: Option<InitConfig>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            cmdline_path: PathBuf::from(DEFAULT_CMDLINE_PATH),
            sys_bus_path: PathBuf::from(DEFAULT_SYS_BUS_PATH),
            root_path: PathBuf::from(DEFAULT_ROOT_PATH),
            overlay_path: PathBuf::from(DEFAULT_OVERLAY_PATH),
            mkdir: false,
            noop: false,
            init: None,
        }
    }
}

impl BootConfig {
    pub fn overlay_lower(&self) -> PathBuf {
        self.overlay_path.join("lower")
    }

    pub fn overlay_upper(&self) -> PathBuf {
        self.overlay_path.join("upper")
    }

    pub fn overlay_work(&self) -> PathBuf {
        self.overlay_path.join("work")
    }
}

fn depth(path: &str) -> usize {
    Path::new(path).components().count()
}

/// Root first, so that every other mount lands inside it, then parents
/// before children.
fn mount_order(a: &MountSpec, b: &MountSpec) -> Ordering {
    (b.name == ROOT_MOUNT)
        .cmp(&(a.name == ROOT_MOUNT))
        .then_with(|| depth(&a.path).cmp(&depth(&b.path)))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn ordered_mounts(mounts: HashMap<String, MountSpec>) -> Vec<MountSpec> {
    let mut mounts: Vec<MountSpec> = mounts.into_values().collect();
    mounts.sort_by(mount_order);
    mounts
}

/// Attaches and mounts every image named on the kernel command line, then
/// hands over to a [`RootTransition`] if a root mount was given.
pub struct BootSequencer {
    config: BootConfig,
    bus: KrbdBus,
    syscall: Box<dyn Syscall>,
}

impl BootSequencer {
    pub fn new(config: BootConfig) -> Self {
        let bus = KrbdBus::new(&config.sys_bus_path);
        Self {
            config,
            bus,
            syscall: create_syscall(),
        }
    }

    pub fn with_syscall(mut self, syscall: Box<dyn Syscall>) -> Self {
        self.syscall = syscall;
        self
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn syscall(&self) -> &dyn Syscall {
        self.syscall.as_ref()
    }

    /// Reads the kernel command line and boots from it. Returns the exit
    /// status of init when it ran in namespaced mode, `None` when there was
    /// nothing to start.
    pub fn run(&self) -> Result<Option<ExitStatus>> {
        let cmdline = cmdline::read(&self.config.cmdline_path)?;
        match self.prepare(&cmdline)? {
            Some(transition) if self.config.noop => {
                tracing::info!(
                    new_root = ?transition.new_root(),
                    init = ?transition.init(),
                    mode = ?transition.mode(),
                    "noop: skipping root transition"
                );
                Ok(None)
            }
            Some(transition) => Ok(Some(transition.run()?)),
            None => Ok(None),
        }
    }

    /// Attaches and mounts everything in `cmdline`. Returns the transition
    /// to run when both a root mount and an init were given.
    pub fn prepare(&self, cmdline: &str) -> Result<Option<RootTransition>> {
        let mounts = ordered_mounts(cmdline::parse(cmdline));
        let root = mounts.iter().find(|m| m.name == ROOT_MOUNT);

        let mut prefix = self.config.root_path.clone();
        let mut overlay = false;
        if let Some(root) = root {
            if root.path != "/" {
                return Err(BootError::RootPath(root.path.clone()));
            }
            if root.overlay {
                prefix = self.config.overlay_lower();
                overlay = true;
            }
        }

        for spec in &mounts {
            self.attach(spec, &prefix)?;
        }

        if root.is_none() {
            tracing::debug!("no root mount on the kernel command line");
            return Ok(None);
        }

        if overlay {
            self.mount_overlay()?;
        }

        Ok(self.config.init.as_ref().map(|init| {
            RootTransition::new(&self.config.root_path, &init.init, init.mode)
        }))
    }

    fn attach(&self, spec: &MountSpec, prefix: &Path) -> Result<()> {
        let name = &spec.name;
        let image = spec
            .image
            .as_ref()
            .ok_or_else(|| BootError::MissingImage(name.clone()))?;

        if spec.path.is_empty() || !spec.path.starts_with('/') {
            return Err(BootError::InvalidPath {
                name: name.clone(),
                path: spec.path.clone(),
            });
        }

        tracing::info!(name, pool = %image.pool, image = %image.image, "mapping image from cmdline");

        if self.config.noop {
            tracing::info!(name, ?image, path = spec.path, "noop: skipping map and mount");
            return Ok(());
        }

        let krbd_err = |source| BootError::Krbd {
            name: name.clone(),
            source,
        };
        self.bus.map(image).map_err(krbd_err)?;
        let device = self.bus.find(&DeviceQuery::from(image)).map_err(krbd_err)?;
        tracing::debug!(?device, "found mapped device");

        let target = match Path::new(&spec.path).as_relative() {
            Ok(relative) if !relative.as_os_str().is_empty() => prefix.join(relative),
            _ => prefix.to_path_buf(),
        };

        if self.config.mkdir {
            utils::create_dir_all(&target).map_err(|source| BootError::CreateDir {
                path: target.clone(),
                source,
            })?;
        }

        let dev = match spec.partition.as_deref() {
            Some(part) if !part.is_empty() => device.dev_path_partition(part),
            _ => device.dev_path(),
        };
        mount::mount_device(
            self.syscall.as_ref(),
            &dev,
            &target,
            &spec.fs_type,
            &spec.mount_options,
        )
        .map_err(|source| BootError::Mount {
            name: name.clone(),
            source,
        })
    }

    fn mount_overlay(&self) -> Result<()> {
        tracing::debug!(root = ?self.config.root_path, "mounting root overlay");
        if self.config.noop {
            return Ok(());
        }
        mount::overlay(
            self.syscall.as_ref(),
            &self.config.overlay_lower(),
            &self.config.overlay_upper(),
            &self.config.overlay_work(),
            &self.config.root_path,
        )
        .map_err(|source| BootError::Mount {
            name: ROOT_MOUNT.to_string(),
            source,
        })
    }
}
