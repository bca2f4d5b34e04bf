//! # rbd
//! Maps Ceph RBD images through the kernel rbd driver and boots a root
//! filesystem from them, either with switch_root or inside new mount and PID
//! namespaces.
mod commands;
mod observability;

use anyhow::Result;
use clap::{crate_version, CommandFactory, Parser};
use librbdboot::krbd::KrbdBus;
use librbdboot_cli::{DeviceCmd, GlobalOpts, RbdCmd};

// High-level commandline option definition
// This takes global options as well as individual commands
#[derive(Parser, Debug)]
#[clap(version = crate_version!(), author = env!("CARGO_PKG_AUTHORS"))]
struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(flatten)]
    rbd_extend: RbdExtendOpts,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
struct RbdExtendOpts {
    /// set the log level (default is 'error')
    #[clap(long)]
    pub log_level: Option<String>,
    /// enable logging to systemd-journald
    #[clap(long)]
    pub systemd_log: bool,
}

#[derive(Parser, Debug)]
enum SubCommand {
    #[clap(flatten)]
    Rbd(RbdCmd),

    Completion(commands::completion::Completion),
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let mut app = Opts::command();

    let log_config = observability::LogConfig::try_from(&opts);
    if let Err(e) = log_config.and_then(|config| observability::init(&config)) {
        eprintln!("log init failed: {e:?}");
    }

    tracing::debug!(
        "started by user {} with {:?}",
        nix::unistd::geteuid(),
        std::env::args_os()
    );
    let noop = opts.global.noop;
    let bus = KrbdBus::default();

    let cmd_result = match opts.subcmd {
        SubCommand::Rbd(cmd) => match cmd {
            RbdCmd::Map(args) => commands::map::map(args, &bus, noop),
            RbdCmd::Unmap(args) => commands::unmap::unmap(args, &bus, noop),
            RbdCmd::Device(device) => match device.cmd {
                DeviceCmd::List(args) => commands::device::list(args, &bus),
            },
            RbdCmd::Boot(args) => commands::boot::boot(args, noop),
        },
        SubCommand::Completion(completion) => {
            commands::completion::completion(completion, &mut app)
        }
    };

    if let Err(ref e) = cmd_result {
        tracing::error!("error in executing command: {:?}", e);
    }
    cmd_result
}
