//! Contains functionality of the boot command
use anyhow::{bail, Context, Result};
use librbdboot::boot::{BootConfig, BootSequencer, InitConfig, RootMode};
use librbdboot_cli::Boot;

fn config_from_args(args: Boot, noop: bool) -> BootConfig {
    let init = match (args.switch_root, args.unshare) {
        (Some(init), _) => Some(InitConfig {
            mode: RootMode::SwitchRoot,
            init,
        }),
        (None, Some(init)) => Some(InitConfig {
            mode: RootMode::Namespaced,
            init,
        }),
        (None, None) => None,
    };

    BootConfig {
        cmdline_path: args.cmdline,
        mkdir: args.mkdir,
        noop,
        init,
        ..Default::default()
    }
}

pub fn boot(args: Boot, noop: bool) -> Result<()> {
    let config = config_from_args(args, noop);
    tracing::debug!(?config, "booting");

    let status = BootSequencer::new(config)
        .run()
        .context("failed to boot from rbd")?;
    if let Some(status) = status {
        if !status.success() {
            bail!("init exited with {status}");
        }
    }
    Ok(())
}
