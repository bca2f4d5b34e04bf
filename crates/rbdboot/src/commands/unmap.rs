//! Contains functionality of the unmap command
use anyhow::{Context, Result};
use librbdboot::krbd::{encode_detach, KrbdBus};
use librbdboot_cli::Unmap;

pub fn unmap(args: Unmap, bus: &KrbdBus, noop: bool) -> Result<()> {
    if noop {
        tracing::info!(payload = encode_detach(args.devid, args.force), "noop: skipping unmap");
        return Ok(());
    }

    bus.unmap(args.devid, args.force)
        .with_context(|| format!("failed to unmap /dev/rbd{}", args.devid))
}
