use std::fmt;

use serde::Deserialize;

/// Per client and per mapping options accepted by `rbd device map`.
///
/// Only fields that differ from their zero value end up in the attach
/// payload, so the kernel applies its own defaults for everything else.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RbdOptions {
    // Client options
    pub fsid: String,
    pub ip: String,
    pub share: bool,
    pub noshare: bool,
    pub crc: bool,
    pub nocrc: bool,
    #[serde(rename = "cephxrequiresignatures", alias = "cephx_require_signatures")]
    pub cephx_require_signatures: bool,
    #[serde(
        rename = "nocephxrequiresignatures",
        alias = "nocephx_require_signatures"
    )]
    pub nocephx_require_signatures: bool,
    #[serde(rename = "tcpnodelay", alias = "tcp_nodelay")]
    pub tcp_nodelay: bool,
    #[serde(rename = "notcpnodelay", alias = "notcp_nodelay")]
    pub notcp_nodelay: bool,
    #[serde(rename = "cephxsignmessages", alias = "cephx_sign_messages")]
    pub cephx_sign_messages: bool,
    #[serde(rename = "nocephxsignmessages", alias = "nocephx_sign_messages")]
    pub nocephx_sign_messages: bool,
    #[serde(rename = "mounttimeout", alias = "mount_timeout")]
    pub mount_timeout: i64,
    pub osdkeepalive: i64,
    #[serde(rename = "osdidlettl", alias = "osd_idle_ttl")]
    pub osd_idle_ttl: i64,

    // Block device options
    /// Only meaningful for detach.
    pub force: bool,
    #[serde(rename = "readwrite", alias = "rw")]
    pub read_write: bool,
    #[serde(rename = "readonly", alias = "ro")]
    pub read_only: bool,
    #[serde(rename = "queuedepth", alias = "queue_depth")]
    pub queue_depth: i64,
    #[serde(rename = "lockonread", alias = "lock_on_read")]
    pub lock_on_read: bool,
    pub exclusive: bool,
    #[serde(rename = "locktimeout", alias = "lock_timeout")]
    pub lock_timeout: u64,
    pub notrim: bool,
    #[serde(rename = "abortonfull", alias = "abort_on_full")]
    pub abort_on_full: bool,
    #[serde(rename = "allocsize", alias = "alloc_size")]
    pub alloc_size: i64,
    pub name: String,
    pub secret: String,
    #[serde(alias = "_pool_ns")]
    pub namespace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue<'a> {
    Flag(bool),
    Int(i64),
    Uint(u64),
    Str(&'a str),
}

impl OptionValue<'_> {
    pub fn is_zero(&self) -> bool {
        match self {
            OptionValue::Flag(v) => !v,
            OptionValue::Int(v) => *v == 0,
            OptionValue::Uint(v) => *v == 0,
            OptionValue::Str(v) => v.is_empty(),
        }
    }
}

impl RbdOptions {
    /// Attach options in the order they are written to the control file.
    /// `force` is not part of the list since the add interface rejects it.
    pub fn wire_fields(&self) -> [(&'static str, OptionValue<'_>); 27] {
        use OptionValue::*;
        [
            ("fsid", Str(&self.fsid)),
            ("ip", Str(&self.ip)),
            ("share", Flag(self.share)),
            ("noshare", Flag(self.noshare)),
            ("crc", Flag(self.crc)),
            ("nocrc", Flag(self.nocrc)),
            ("cephx_require_signatures", Flag(self.cephx_require_signatures)),
            (
                "nocephx_require_signatures",
                Flag(self.nocephx_require_signatures),
            ),
            ("tcp_nodelay", Flag(self.tcp_nodelay)),
            ("notcp_nodelay", Flag(self.notcp_nodelay)),
            ("cephx_sign_messages", Flag(self.cephx_sign_messages)),
            ("nocephx_sign_messages", Flag(self.nocephx_sign_messages)),
            ("mount_timeout", Int(self.mount_timeout)),
            ("osdkeepalive", Int(self.osdkeepalive)),
            ("osd_idle_ttl", Int(self.osd_idle_ttl)),
            ("rw", Flag(self.read_write)),
            ("ro", Flag(self.read_only)),
            ("queue_depth", Int(self.queue_depth)),
            ("lock_on_read", Flag(self.lock_on_read)),
            ("exclusive", Flag(self.exclusive)),
            ("lock_timeout", Uint(self.lock_timeout)),
            ("notrim", Flag(self.notrim)),
            ("abort_on_full", Flag(self.abort_on_full)),
            ("alloc_size", Int(self.alloc_size)),
            ("name", Str(&self.name)),
            ("secret", Str(&self.secret)),
            ("_pool_ns", Str(&self.namespace)),
        ]
    }
}

impl fmt::Display for RbdOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.wire_fields() {
            if value.is_zero() {
                continue;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match value {
                OptionValue::Flag(_) => f.write_str(name)?,
                OptionValue::Int(v) => write!(f, "{name}={v}")?,
                OptionValue::Uint(v) => write!(f, "{name}={v}")?,
                OptionValue::Str(v) => write!(f, "{name}={v}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_default_is_empty() {
        assert_eq!(RbdOptions::default().to_string(), "");
    }

    #[test]
    fn test_only_non_zero_fields() {
        let opts = RbdOptions {
            name: "admin".to_string(),
            secret: "S".to_string(),
            ..Default::default()
        };
        assert_eq!(opts.to_string(), "name=admin,secret=S");
    }

    #[test]
    fn test_declared_order() {
        let opts = RbdOptions {
            namespace: "ns".to_string(),
            read_only: true,
            queue_depth: 128,
            lock_timeout: u64::MAX,
            noshare: true,
            fsid: "abc".to_string(),
            ..Default::default()
        };
        assert_eq!(
            opts.to_string(),
            format!("fsid=abc,noshare,ro,queue_depth=128,lock_timeout={},_pool_ns=ns", u64::MAX)
        );
    }

    #[test]
    fn test_force_is_not_encoded() {
        let opts = RbdOptions {
            force: true,
            ..Default::default()
        };
        assert_eq!(opts.to_string(), "");
    }

    #[test]
    fn test_negative_values_are_encoded() {
        let opts = RbdOptions {
            mount_timeout: -1,
            ..Default::default()
        };
        assert_eq!(opts.to_string(), "mount_timeout=-1");
    }

    #[test]
    fn test_deserialize_names_and_aliases() -> Result<()> {
        let opts: RbdOptions =
            serde_json::from_str(r#"{"readonly": true, "queue_depth": 4, "_pool_ns": "x"}"#)?;
        assert!(opts.read_only);
        assert_eq!(opts.queue_depth, 4);
        assert_eq!(opts.namespace, "x");

        let opts: RbdOptions = serde_json::from_str(r#"{"ro": true, "queuedepth": 8}"#)?;
        assert!(opts.read_only);
        assert_eq!(opts.queue_depth, 8);
        Ok(())
    }
}
