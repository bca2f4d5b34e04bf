use std::fs;
use std::path::Path;

use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult};

const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("failed to fork")]
    Fork(#[source] nix::Error),
    #[error("failed to wait for child process")]
    Wait(#[source] nix::Error),
    #[error("function in child process failed, see its stderr")]
    Execution,
    #[error("the closure caused the child process to panic")]
    Panic,
    #[error("child process ended unexpectedly: {0:?}")]
    Unexpected(WaitStatus),
}

#[derive(Debug, thiserror::Error)]
pub enum TestCallbackError {
    #[error("{0}")]
    Custom(String),
    #[error("{0:?}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<&str> for TestCallbackError {
    fn from(s: &str) -> Self {
        TestCallbackError::Custom(s.to_string())
    }
}

impl From<String> for TestCallbackError {
    fn from(s: String) -> Self {
        TestCallbackError::Custom(s)
    }
}

/// Runs `cb` in a forked child so that changes to process wide state, such
/// as the root directory or namespaces, do not leak into the test runner.
/// The outcome is reported back through the child's exit code.
pub fn test_in_child_process<F>(cb: F) -> Result<(), TestError>
where
    F: FnOnce() -> Result<(), TestCallbackError> + std::panic::UnwindSafe,
{
    match unsafe { unistd::fork().map_err(TestError::Fork)? } {
        ForkResult::Parent { child } => match wait::waitpid(child, None).map_err(TestError::Wait)? {
            WaitStatus::Exited(_, 0) => Ok(()),
            WaitStatus::Exited(_, EXIT_PANIC) => Err(TestError::Panic),
            WaitStatus::Exited(_, _) => Err(TestError::Execution),
            status => Err(TestError::Unexpected(status)),
        },
        ForkResult::Child => {
            let code = match std::panic::catch_unwind(cb) {
                Ok(Ok(())) => 0,
                Ok(Err(err)) => {
                    eprintln!("child process error: {err}");
                    EXIT_ERROR
                }
                Err(_) => EXIT_PANIC,
            };
            std::process::exit(code);
        }
    }
}

/// Lays out a fake rbd sysfs bus below `bus`: the device directory at
/// `<bus>/rbd/<id>` holding one file per attribute, and a symlink to it at
/// `<bus>/devices/<id>`.
pub fn fake_device(bus: &Path, id: u64, attrs: &[(&str, &str)]) -> std::io::Result<()> {
    let real = bus.join("rbd").join(id.to_string());
    fs::create_dir_all(&real)?;
    for (name, value) in attrs {
        fs::write(real.join(name), format!("{value}\n"))?;
    }
    let devices = bus.join("devices");
    fs::create_dir_all(&devices)?;
    std::os::unix::fs::symlink(&real, devices.join(id.to_string()))
}
