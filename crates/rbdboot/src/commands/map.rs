//! Contains functionality of the map command
use anyhow::{Context, Result};
use librbdboot::krbd::{DeviceQuery, KrbdBus, RbdDevice, RbdImage, RbdOptions};
use librbdboot::LibrbdbootError;
use librbdboot_cli::Map;

fn image_from_args(args: Map) -> RbdImage {
    RbdImage {
        monitors: args.monitors,
        pool: args.pool,
        image: args.image,
        namespace: args.namespace,
        snapshot: args.snap,
        options: RbdOptions {
            name: args.id.unwrap_or_default(),
            secret: args.secret.unwrap_or_default(),
            read_only: args.read_only,
            ..Default::default()
        },
    }
}

fn map_image(bus: &KrbdBus, image: &RbdImage) -> Result<RbdDevice, LibrbdbootError> {
    bus.map(image)?;
    Ok(bus.find(&DeviceQuery::from(image))?)
}

/// Maps the image and prints the block device it was attached as
pub fn map(args: Map, bus: &KrbdBus, noop: bool) -> Result<()> {
    let image = image_from_args(args);
    if noop {
        let payload = image.encode_attach()?;
        tracing::info!(payload, "noop: skipping map");
        return Ok(());
    }

    let device = map_image(bus, &image)
        .with_context(|| format!("failed to map image {}/{}", image.pool, image.image))?;
    println!("{}", device.dev_path().display());
    Ok(())
}
