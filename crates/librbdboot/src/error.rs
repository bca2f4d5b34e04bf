use crate::boot::{BootError, TransitionError};
use crate::cmdline::CmdlineError;
use crate::krbd::KrbdError;
use crate::mount::MountError;
use crate::syscall::SyscallError;

#[derive(Debug, thiserror::Error)]
pub enum LibrbdbootError {
    #[error(transparent)]
    Cmdline(#[from] CmdlineError),
    #[error(transparent)]
    Krbd(#[from] KrbdError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Boot(#[from] BootError),
    #[error(transparent)]
    Syscall(#[from] SyscallError),
}
