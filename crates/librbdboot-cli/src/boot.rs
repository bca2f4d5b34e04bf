use std::path::PathBuf;

use clap::Parser;

/// Boot from RBD images described on the kernel command line
#[derive(Parser, Debug)]
pub struct Boot {
    /// Create the destination mount path if it doesn't exist
    #[clap(short, long)]
    pub mkdir: bool,
    /// switch_root to the root filesystem and execute the given init
    #[clap(short, long, conflicts_with = "unshare", value_name = "INIT")]
    pub switch_root: Option<PathBuf>,
    /// Execute the given init in new mount and PID namespaces inside the root filesystem
    #[clap(short, long, value_name = "INIT")]
    pub unshare: Option<PathBuf>,
    /// Path to the kernel command line
    #[clap(short, long, default_value = "/proc/cmdline")]
    pub cmdline: PathBuf,
}
