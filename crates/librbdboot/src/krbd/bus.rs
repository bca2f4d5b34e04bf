use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::{
    encode_detach, find, list_devices, write_payload, DeviceQuery, KrbdError, RbdDevice,
    RbdImage, Result,
};

pub const DEFAULT_SYS_BUS_PATH: &str = "/sys/bus/rbd";

/// Handle on the rbd sysfs bus directory.
#[derive(Debug, Clone)]
pub struct KrbdBus {
    root: PathBuf,
}

impl Default for KrbdBus {
    fn default() -> Self {
        Self::new(DEFAULT_SYS_BUS_PATH)
    }
}

impl KrbdBus {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open_control(&self, preferred: &str, legacy: &str) -> Result<File> {
        let preferred = self.root.join(preferred);
        let legacy = self.root.join(legacy);
        let path = if preferred.exists() {
            &preferred
        } else if legacy.exists() {
            &legacy
        } else {
            return Err(KrbdError::ControlFileNotFound { preferred, legacy });
        };

        OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|err| KrbdError::Io {
                path: path.clone(),
                source: err,
            })
    }

    /// Opens `add_single_major`, falling back to `add`.
    pub fn add_writer(&self) -> Result<File> {
        self.open_control("add_single_major", "add")
    }

    /// Opens `remove_single_major`, falling back to `remove`.
    pub fn remove_writer(&self) -> Result<File> {
        self.open_control("remove_single_major", "remove")
    }

    pub fn devices(&self) -> Result<Vec<RbdDevice>> {
        list_devices(self.root.join("devices"))
    }

    pub fn find(&self, query: &DeviceQuery) -> Result<RbdDevice> {
        find(&self.devices()?, query)
    }

    #[tracing::instrument(level = "debug", skip(self, image), fields(pool = %image.pool, image = %image.image))]
    pub fn map(&self, image: &RbdImage) -> Result<()> {
        let payload = image.encode_attach()?;
        let mut writer = self.add_writer()?;
        tracing::debug!(payload, "mapping image");
        write_payload(&mut writer, &payload)
    }

    pub fn unmap(&self, id: u64, force: bool) -> Result<()> {
        let payload = encode_detach(id, force);
        let mut writer = self.remove_writer()?;
        tracing::debug!(payload, "unmapping device");
        write_payload(&mut writer, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fake_device;
    use anyhow::Result;
    use std::fs;

    #[test]
    fn test_control_file_missing() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bus = KrbdBus::new(tmp.path());
        assert!(matches!(
            bus.add_writer(),
            Err(KrbdError::ControlFileNotFound { .. })
        ));
        assert!(matches!(
            bus.remove_writer(),
            Err(KrbdError::ControlFileNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_map_prefers_single_major() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("add"), "")?;
        fs::write(tmp.path().join("add_single_major"), "")?;
        let bus = KrbdBus::new(tmp.path());

        let image = RbdImage {
            monitors: vec!["mon1".to_string()],
            pool: "rbd".to_string(),
            image: "img".to_string(),
            ..Default::default()
        };
        bus.map(&image)?;

        assert_eq!(
            fs::read_to_string(tmp.path().join("add_single_major"))?,
            "mon1  rbd img -"
        );
        assert_eq!(fs::read_to_string(tmp.path().join("add"))?, "");
        Ok(())
    }

    #[test]
    fn test_unmap_legacy() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("remove"), "")?;
        let bus = KrbdBus::new(tmp.path());
        bus.unmap(3, true)?;
        assert_eq!(fs::read_to_string(tmp.path().join("remove"))?, "3 force");
        Ok(())
    }

    #[test]
    fn test_map_invalid_image_writes_nothing() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("add"), "")?;
        let bus = KrbdBus::new(tmp.path());
        assert!(matches!(
            bus.map(&RbdImage::default()),
            Err(KrbdError::InvalidSpec(_))
        ));
        assert_eq!(fs::read_to_string(tmp.path().join("add"))?, "");
        Ok(())
    }

    #[test]
    fn test_find_through_bus() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        fake_device(tmp.path(), 1, &[("pool", "rbd"), ("name", "root")])?;
        fake_device(tmp.path(), 0, &[("pool", "rbd"), ("name", "data")])?;
        let bus = KrbdBus::new(tmp.path());

        let image = RbdImage {
            pool: "rbd".to_string(),
            image: "root".to_string(),
            ..Default::default()
        };
        let device = bus.find(&DeviceQuery::from(&image))?;
        assert_eq!(device.id, 1);
        assert_eq!(device.dev_path(), PathBuf::from("/dev/rbd1"));
        Ok(())
    }
}
