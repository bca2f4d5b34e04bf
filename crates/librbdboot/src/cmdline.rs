//! Kernel command line parsing for `rbd.<name>=<json>` and `rbd=<json>`
//! parameters.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::krbd::RbdImage;
use crate::utils::string_or_seq;

pub const DEFAULT_CMDLINE_PATH: &str = "/proc/cmdline";

const PREFIX: &str = "rbd";

#[derive(Debug, thiserror::Error)]
pub enum CmdlineError {
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("expected a json object, got {0}")]
    NotAnObject(String),
    #[error("empty mount name")]
    EmptyName,
    #[error("setting {attribute} on mount {name} is not supported, use rbd.{name}=<json>")]
    UnsupportedAttribute { name: String, attribute: String },
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, CmdlineError>;

/// A volume to attach and mount during boot.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MountSpec {
    #[serde(skip)]
    pub name: String,
    pub image: Option<RbdImage>,
    #[serde(rename = "mntopts", alias = "mount_options", deserialize_with = "string_or_seq")]
    pub mount_options: Vec<String>,
    #[serde(rename = "part", alias = "partition")]
    pub partition: Option<String>,
    pub overlay: bool,
    pub path: String,
    #[serde(rename = "fstype", alias = "fs_type")]
    pub fs_type: String,
}

/// Reads the kernel command line, usually from `/proc/cmdline`.
pub fn read<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|err| {
        tracing::error!(?path, ?err, "failed to read kernel command line");
        CmdlineError::Io {
            path: path.to_path_buf(),
            source: err,
        }
    })
}

/// Splits on whitespace, except inside quotes, brackets and braces.
pub fn split(s: &str) -> Vec<&str> {
    // Keyed by the character that closes the group.
    let mut depth: HashMap<char, usize> = HashMap::new();
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, c) in s.char_indices() {
        match c {
            '\'' | '"' => {
                let d = depth.entry(c).or_default();
                *d = if *d > 0 { 0 } else { 1 };
            }
            '[' => *depth.entry(']').or_default() += 1,
            '{' => *depth.entry('}').or_default() += 1,
            ']' | '}' => {
                if let Some(d) = depth.get_mut(&c) {
                    *d = d.saturating_sub(1);
                }
            }
            _ => {}
        }

        if c.is_whitespace() && depth.values().all(|d| *d == 0) {
            if let Some(begin) = start.take() {
                tokens.push(&s[begin..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(begin) = start {
        tokens.push(&s[begin..]);
    }

    tokens
}

/// Merges `src` into `dst`. Objects are merged key by key, anything else
/// replaces the old value.
fn merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        dst.insert(key, value);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    mounts: HashMap<String, (Value, MountSpec)>,
}

impl Accumulator {
    fn merge_fragment(&mut self, name: &str, fragment: Value) -> Result<()> {
        if name.is_empty() {
            return Err(CmdlineError::EmptyName);
        }
        if !fragment.is_object() {
            return Err(CmdlineError::NotAnObject(fragment.to_string()));
        }

        let mut merged = match self.mounts.get(name) {
            Some((value, _)) => value.clone(),
            None => Value::Object(Map::new()),
        };
        merge(&mut merged, fragment);

        let mut spec: MountSpec = serde_json::from_value(merged.clone())?;
        spec.name = name.to_string();
        self.mounts.insert(name.to_string(), (merged, spec));
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        if key == PREFIX {
            let fragments = match serde_json::from_str::<Value>(value)? {
                Value::Object(map) => map,
                other => return Err(CmdlineError::NotAnObject(other.to_string())),
            };
            for (name, fragment) in fragments {
                self.merge_fragment(&name, fragment)?;
            }
            return Ok(());
        }

        // Caller guarantees the "rbd." prefix.
        let path = &key[PREFIX.len() + 1..];
        match path.split_once('.') {
            None => {
                let fragment = serde_json::from_str::<Value>(value)?;
                self.merge_fragment(path, fragment)
            }
            Some((name, attribute)) => Err(CmdlineError::UnsupportedAttribute {
                name: name.to_string(),
                attribute: attribute.to_string(),
            }),
        }
    }
}

/// Extracts the mount specs from a kernel command line. Malformed rbd
/// parameters are logged and skipped, they never fail the whole parse.
pub fn parse(cmdline: &str) -> HashMap<String, MountSpec> {
    let mut acc = Accumulator::default();

    for token in split(cmdline) {
        let (key, value) = match token.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        if key != PREFIX && !key.starts_with("rbd.") {
            continue;
        }

        // A token either applies completely or not at all.
        let mut next = Accumulator {
            mounts: acc.mounts.clone(),
        };
        match next.apply(key, value) {
            Ok(()) => acc = next,
            Err(err) => tracing::warn!(%err, token, "skipping rbd parameter"),
        }
    }

    acc.mounts
        .into_iter()
        .map(|(name, (_, spec))| (name, spec))
        .collect()
}
