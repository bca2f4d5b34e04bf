use clap::Parser;

/// Unmap an RBD device
#[derive(Parser, Debug)]
pub struct Unmap {
    /// Device id, as in /dev/rbd<id>
    #[clap(short, long, required = true)]
    pub devid: u64,
    /// Unmap even if the device is still open
    #[clap(short, long)]
    pub force: bool,
}
