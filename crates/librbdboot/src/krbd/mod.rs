//! Encoding and decoding for the kernel RBD client's sysfs interface.
//!
//! See Documentation/ABI/testing/sysfs-bus-rbd in the kernel tree.

mod bus;
mod device;
mod image;
mod options;

pub use bus::{KrbdBus, DEFAULT_SYS_BUS_PATH};
pub use device::{find, list_devices, DeviceQuery, RbdDevice};
pub use image::{encode_detach, write_payload, RbdImage};
pub use options::{OptionValue, RbdOptions};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum KrbdError {
    #[error("invalid image spec: {0}")]
    InvalidSpec(String),
    #[error("short write to control file: wrote {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error("no mapped device matches {0:?}")]
    NotFound(DeviceQuery),
    #[error("device query has no attributes set")]
    EmptyQuery,
    #[error("could not find {preferred:?} or {legacy:?}")]
    ControlFileNotFound { preferred: PathBuf, legacy: PathBuf },
    #[error("missing device attribute {path:?}")]
    MissingAttribute {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid device id {0:?}")]
    InvalidDeviceId(String),
    #[error("io error on {path:?}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write control payload")]
    Write(#[source] std::io::Error),
}

type Result<T> = std::result::Result<T, KrbdError>;
