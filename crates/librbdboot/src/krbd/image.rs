use std::io::Write;

use serde::Deserialize;

use super::{KrbdError, RbdOptions, Result};
use crate::utils::string_or_seq;

/// A Ceph RBD image as described on the kernel command line.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RbdImage {
    #[serde(
        rename = "mons",
        alias = "mon",
        alias = "monitors",
        deserialize_with = "string_or_seq"
    )]
    pub monitors: Vec<String>,
    pub pool: String,
    pub image: String,
    pub namespace: Option<String>,
    #[serde(rename = "snap", alias = "snapshot")]
    pub snapshot: Option<String>,
    #[serde(rename = "opts", alias = "options")]
    pub options: RbdOptions,
}

impl RbdImage {
    /// Builds the payload for `/sys/bus/rbd/add`:
    /// `<mons> <options> <pool> <image> <snap>`.
    pub fn encode_attach(&self) -> Result<String> {
        if self.monitors.is_empty() {
            return Err(KrbdError::InvalidSpec("no monitors".to_string()));
        }
        if self.pool.is_empty() {
            return Err(KrbdError::InvalidSpec("no pool".to_string()));
        }
        if self.image.is_empty() {
            return Err(KrbdError::InvalidSpec("no image".to_string()));
        }

        let options = match &self.namespace {
            Some(ns) if !ns.is_empty() && self.options.namespace.is_empty() => {
                let mut options = self.options.clone();
                options.namespace = ns.clone();
                options.to_string()
            }
            _ => self.options.to_string(),
        };

        let snapshot = match self.snapshot.as_deref() {
            Some(snap) if !snap.is_empty() => snap,
            _ => "-",
        };

        Ok(format!(
            "{} {} {} {} {}",
            self.monitors.join(","),
            options,
            self.pool,
            self.image,
            snapshot
        ))
    }

    /// Pool namespace the device will report in sysfs.
    pub fn effective_namespace(&self) -> Option<&str> {
        if !self.options.namespace.is_empty() {
            return Some(&self.options.namespace);
        }
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

/// Builds the payload for `/sys/bus/rbd/remove`.
pub fn encode_detach(id: u64, force: bool) -> String {
    if force {
        format!("{id} force")
    } else {
        id.to_string()
    }
}

/// Sysfs control files take the whole request in a single write.
pub fn write_payload<W: Write>(writer: &mut W, payload: &str) -> Result<()> {
    let expected = payload.len();
    let written = writer.write(payload.as_bytes()).map_err(|err| {
        tracing::error!(?err, payload, "failed to write to control file");
        KrbdError::Write(err)
    })?;
    if written != expected {
        return Err(KrbdError::ShortWrite { expected, written });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn image() -> RbdImage {
        RbdImage {
            monitors: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            pool: "rbd".to_string(),
            image: "img".to_string(),
            options: RbdOptions {
                name: "admin".to_string(),
                secret: "S".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_attach() -> Result<()> {
        assert_eq!(
            image().encode_attach()?,
            "10.0.0.1,10.0.0.2 name=admin,secret=S rbd img -"
        );
        Ok(())
    }

    #[test]
    fn test_encode_attach_snapshot_and_namespace() -> Result<()> {
        let img = RbdImage {
            snapshot: Some("snap1".to_string()),
            namespace: Some("tenant".to_string()),
            ..image()
        };
        assert_eq!(
            img.encode_attach()?,
            "10.0.0.1,10.0.0.2 name=admin,secret=S,_pool_ns=tenant rbd img snap1"
        );
        Ok(())
    }

    #[test]
    fn test_options_namespace_wins() -> Result<()> {
        let mut img = image();
        img.namespace = Some("ignored".to_string());
        img.options.namespace = "used".to_string();
        assert!(img.encode_attach()?.contains("_pool_ns=used"));
        assert_eq!(img.effective_namespace(), Some("used"));
        Ok(())
    }

    #[test]
    fn test_encode_attach_empty_monitors() {
        let img = RbdImage {
            monitors: vec![],
            ..image()
        };
        assert!(matches!(img.encode_attach(), Err(KrbdError::InvalidSpec(_))));
    }

    #[test]
    fn test_encode_attach_empty_pool() {
        let img = RbdImage {
            pool: String::new(),
            ..image()
        };
        assert!(matches!(img.encode_attach(), Err(KrbdError::InvalidSpec(_))));
    }

    #[test]
    fn test_encode_attach_empty_image() {
        let img = RbdImage {
            image: String::new(),
            ..image()
        };
        assert!(matches!(img.encode_attach(), Err(KrbdError::InvalidSpec(_))));
    }

    #[test]
    fn test_encode_detach() {
        assert_eq!(encode_detach(1, true), "1 force");
        assert_eq!(encode_detach(0, false), "0");
    }

    struct ShortWriter;

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len() / 2)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_payload() -> Result<()> {
        let mut buf = Vec::new();
        write_payload(&mut buf, "0 force")?;
        assert_eq!(buf, b"0 force");

        match write_payload(&mut ShortWriter, "1234") {
            Err(KrbdError::ShortWrite { expected, written }) => {
                assert_eq!((expected, written), (4, 2));
            }
            other => panic!("expected a short write, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_deserialize() -> Result<()> {
        let img: RbdImage = serde_json::from_str(
            r#"{"mons": "10.0.0.1,10.0.0.2", "pool": "rbd", "image": "img", "snap": "s", "opts": {"name": "admin"}}"#,
        )?;
        assert_eq!(img.monitors, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(img.snapshot.as_deref(), Some("s"));
        assert_eq!(img.options.name, "admin");

        let img: RbdImage = serde_json::from_str(r#"{"monitors": ["a:6789"]}"#)?;
        assert_eq!(img.monitors, vec!["a:6789"]);
        Ok(())
    }
}
