//! Utility functionality

use std::fmt;
use std::fs::{self, File};
use std::os::linux::fs::MetadataExt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer, SeqAccess, Visitor};

#[derive(Debug, thiserror::Error)]
pub enum PathBufExtError {
    #[error("relative path cannot be converted to a path under another root")]
    RelativePath,
    #[error("failed to strip prefix from {path:?}")]
    StripPrefix {
        path: PathBuf,
        source: std::path::StripPrefixError,
    },
}

pub trait PathBufExt {
    fn as_relative(&self) -> Result<&Path, PathBufExtError>;
}

impl PathBufExt for Path {
    fn as_relative(&self) -> Result<&Path, PathBufExtError> {
        match self.is_relative() {
            true => Err(PathBufExtError::RelativePath),
            false => Ok(self
                .strip_prefix("/")
                .map_err(|e| PathBufExtError::StripPrefix {
                    path: self.to_path_buf(),
                    source: e,
                })?),
        }
    }
}

pub fn create_dir_all<P: AsRef<Path>>(path: P) -> Result<(), std::io::Error> {
    fs::create_dir_all(path.as_ref()).map_err(|err| {
        tracing::error!(path = ?path.as_ref(), ?err, "failed to create directory");
        err
    })?;
    Ok(())
}

pub fn open<P: AsRef<Path>>(path: P) -> Result<File, std::io::Error> {
    File::open(path.as_ref()).map_err(|err| {
        tracing::error!(path = ?path.as_ref(), ?err, "failed to open file");
        err
    })
}

/// Device id of the filesystem an already opened file lives on.
pub fn device_id(file: &File) -> Result<u64, std::io::Error> {
    Ok(file.metadata()?.st_dev())
}

/// A directory is a mount point when it sits on a different device than its
/// parent. Anything that cannot be opened is reported as not a mount point,
/// `/` always is one.
pub fn is_mountpoint<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => return false,
        None => return path.has_root(),
    };

    let parent_dev = match File::open(parent).and_then(|f| device_id(&f)) {
        Ok(dev) => dev,
        Err(_) => return false,
    };

    match File::open(path) {
        Ok(dir) => is_mountpoint_at(parent_dev, &dir),
        Err(_) => false,
    }
}

pub fn is_mountpoint_at(parent_dev: u64, dir: &File) -> bool {
    match device_id(dir) {
        Ok(dev) => dev != parent_dev,
        Err(_) => false,
    }
}

/// Accepts either a JSON list of strings or a single comma separated string.
pub fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrSeq;

    impl<'de> Visitor<'de> for StringOrSeq {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect())
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut values = Vec::new();
            while let Some(value) = seq.next_element::<String>()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    deserializer.deserialize_any(StringOrSeq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "string_or_seq")]
        values: Vec<String>,
    }

    #[test]
    fn test_as_relative() -> Result<()> {
        assert_eq!(Path::new("/sbin/init").as_relative()?, Path::new("sbin/init"));
        assert!(Path::new("sbin/init").as_relative().is_err());
        Ok(())
    }

    #[test]
    fn test_string_or_seq() -> Result<()> {
        let h: Holder = serde_json::from_str(r#"{"values": ["ro", "noatime"]}"#)?;
        assert_eq!(h.values, vec!["ro", "noatime"]);
        let h: Holder = serde_json::from_str(r#"{"values": "ro, noatime"}"#)?;
        assert_eq!(h.values, vec!["ro", "noatime"]);
        let h: Holder = serde_json::from_str(r#"{"values": null}"#)?;
        assert!(h.values.is_empty());
        assert!(serde_json::from_str::<Holder>(r#"{"values": 5}"#).is_err());
        Ok(())
    }

    #[test]
    fn test_is_mountpoint() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let nested = tmp.path().join("nested");
        fs::create_dir(&nested)?;
        assert!(!is_mountpoint(&nested));
        assert!(!is_mountpoint(tmp.path().join("missing")));
        assert!(is_mountpoint("/"));
        assert!(!is_mountpoint(""));
        // proc is mounted on its own device in any environment running tests
        if Path::new("/proc/self").exists() {
            assert!(is_mountpoint("/proc"));
        }
        Ok(())
    }
}
