use clap::{Parser, Subcommand};

/// Inspect mapped RBD devices
#[derive(Parser, Debug)]
pub struct Device {
    #[clap(subcommand)]
    pub cmd: DeviceCmd,
}

#[derive(Subcommand, Debug)]
pub enum DeviceCmd {
    List(List),
}

/// List mapped RBD devices
#[derive(Parser, Debug)]
pub struct List {
    /// Specify the format (table or json)
    #[clap(long, default_value = "table")]
    pub format: String,
}
