use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{KrbdError, RbdImage, Result};

/// A mapped RBD block device discovered under `/sys/bus/rbd/devices`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RbdDevice {
    pub id: u64,
    pub pool: String,
    pub namespace: String,
    pub image: String,
    pub snapshot: String,
}

/// Attribute files read for every device, and whether they must exist.
const ATTRIBUTES: [(&str, bool); 4] = [
    ("pool", true),
    ("pool_ns", false),
    ("name", true),
    ("current_snap", false),
];

impl RbdDevice {
    pub fn dev_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/rbd{}", self.id))
    }

    pub fn dev_path_partition(&self, partition: &str) -> PathBuf {
        PathBuf::from(format!("/dev/rbd{}p{}", self.id, partition))
    }

    fn attribute_mut(&mut self, file: &str) -> &mut String {
        match file {
            "pool" => &mut self.pool,
            "pool_ns" => &mut self.namespace,
            "name" => &mut self.image,
            _ => &mut self.snapshot,
        }
    }

    fn read_attributes(id: u64, dir: &Path) -> Result<Self> {
        let mut device = RbdDevice {
            id,
            ..Default::default()
        };
        for (file, required) in ATTRIBUTES {
            let path = dir.join(file);
            match fs::read_to_string(&path) {
                Ok(value) => *device.attribute_mut(file) = value.trim().to_string(),
                Err(err) if err.kind() == ErrorKind::NotFound && !required => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(KrbdError::MissingAttribute { path, source: err });
                }
                Err(err) => return Err(KrbdError::Io { path, source: err }),
            }
        }
        Ok(device)
    }
}

/// Reads every mapped device below `dir`, sorted by ascending id.
pub fn list_devices<P: AsRef<Path>>(dir: P) -> Result<Vec<RbdDevice>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|err| KrbdError::Io {
        path: dir.to_path_buf(),
        source: err,
    })?;

    let mut devices = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| KrbdError::Io {
            path: dir.to_path_buf(),
            source: err,
        })?;
        let name = entry.file_name();
        let id = match name.to_str().map(str::parse::<u64>) {
            Some(Ok(id)) => id,
            _ => {
                tracing::debug!(?name, "skipping non device entry");
                continue;
            }
        };

        let path = entry.path();
        let real_path = fs::canonicalize(&path).map_err(|err| KrbdError::Io { path, source: err })?;
        devices.push(RbdDevice::read_attributes(id, &real_path)?);
    }

    devices.sort_by_key(|d| d.id);
    Ok(devices)
}

/// Attributes to match a mapped device against. Unset or empty fields match
/// anything.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceQuery {
    pub pool: Option<String>,
    pub namespace: Option<String>,
    pub image: Option<String>,
    pub snapshot: Option<String>,
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl DeviceQuery {
    pub fn is_empty(&self) -> bool {
        set(&self.pool).is_none()
            && set(&self.namespace).is_none()
            && set(&self.image).is_none()
            && set(&self.snapshot).is_none()
    }

    pub fn matches(&self, device: &RbdDevice) -> bool {
        let eq = |want: &Option<String>, have: &str| set(want).map_or(true, |w| w == have);
        eq(&self.pool, &device.pool)
            && eq(&self.namespace, &device.namespace)
            && eq(&self.image, &device.image)
            && eq(&self.snapshot, &device.snapshot)
    }
}

impl From<&RbdImage> for DeviceQuery {
    fn from(image: &RbdImage) -> Self {
        DeviceQuery {
            pool: Some(image.pool.clone()),
            namespace: image.effective_namespace().map(String::from),
            image: Some(image.image.clone()),
            snapshot: image.snapshot.clone(),
        }
    }
}

/// Returns the first device, in the order given, that matches the query.
pub fn find(devices: &[RbdDevice], query: &DeviceQuery) -> Result<RbdDevice> {
    if query.is_empty() {
        return Err(KrbdError::EmptyQuery);
    }
    devices
        .iter()
        .find(|d| query.matches(d))
        .cloned()
        .ok_or_else(|| KrbdError::NotFound(query.clone()))
}
