use std::fmt::Debug;
use std::path::PathBuf;

use clap::Parser;

mod boot;
mod device;
mod map;
mod unmap;

pub use boot::Boot;
pub use device::{Device, DeviceCmd, List};
pub use map::Map;
pub use unmap::Unmap;

/// Subcommands that manage RBD mappings and booting from them
#[derive(Parser, Debug)]
pub enum RbdCmd {
    Map(Map),
    Unmap(Unmap),
    Device(Device),
    Boot(Boot),
}

#[derive(Parser, Debug)]
pub struct GlobalOpts {
    /// set the log file to write logs to (default is '/dev/stderr')
    #[clap(short, long, overrides_with("log"))]
    pub log: Option<PathBuf>,
    /// change log level to debug, but the `log-level` flag takes precedence
    #[clap(long)]
    pub debug: bool,
    /// set the log format ('text' (default), or 'json') (default: "text")
    #[clap(long)]
    pub log_format: Option<String>,
    /// log verbosely, same as --debug
    #[clap(short, long)]
    pub verbose: bool,
    /// log what would be done without touching the system
    #[clap(short, long)]
    pub noop: bool,
}
