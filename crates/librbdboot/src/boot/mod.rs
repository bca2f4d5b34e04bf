//! Moving the running system onto a new root and starting init there.

pub mod cleanup;
pub mod sequencer;
pub mod transition;
mod validate;

pub use sequencer::{BootConfig, BootError, BootSequencer, InitConfig};
pub use transition::{RootMode, RootTransition};

use std::fmt;
use std::path::PathBuf;

use crate::syscall::SyscallError;

/// Steps of a root transition, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ValidatingImage,
    ValidatingInit,
    Unsharing,
    MovingRoot,
    CleaningOldRoot,
    ExecingInit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ValidatingImage => "validating image",
            Phase::ValidatingInit => "validating init",
            Phase::Unsharing => "unsharing namespaces",
            Phase::MovingRoot => "moving root",
            Phase::CleaningOldRoot => "cleaning old root",
            Phase::ExecingInit => "executing init",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("{phase}: {reason}")]
    ValidationFailed { phase: Phase, reason: String },
    #[error("{phase}: failed to move {source_path:?} to {target:?}")]
    MountMoveFailed {
        phase: Phase,
        source_path: PathBuf,
        target: PathBuf,
        #[source]
        err: SyscallError,
    },
    #[error("{phase}: failed syscall")]
    Syscall {
        phase: Phase,
        #[source]
        source: SyscallError,
    },
    #[error("{phase}: failed to open {path:?}")]
    Io {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{phase}: failed to start {init:?}")]
    ExecFailed {
        phase: Phase,
        init: PathBuf,
        #[source]
        source: SyscallError,
    },
}

impl TransitionError {
    /// The phase the transition was in when it failed.
    pub fn phase(&self) -> Phase {
        match self {
            TransitionError::ValidationFailed { phase, .. }
            | TransitionError::MountMoveFailed { phase, .. }
            | TransitionError::Syscall { phase, .. }
            | TransitionError::Io { phase, .. }
            | TransitionError::ExecFailed { phase, .. } => *phase,
        }
    }

    pub(crate) fn validation(phase: Phase, reason: impl Into<String>) -> Self {
        TransitionError::ValidationFailed {
            phase,
            reason: reason.into(),
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, TransitionError>;
