//! Contains functionality of the device list command
use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use librbdboot::krbd::{KrbdBus, RbdDevice};
use librbdboot_cli::List;
use tabwriter::TabWriter;

fn write_table<W: Write>(out: W, devices: &[RbdDevice]) -> Result<()> {
    let mut tab_writer = TabWriter::new(out);
    writeln!(&mut tab_writer, "id\tpool\tnamespace\timage\tsnap\tdevice")?;
    for device in devices {
        writeln!(
            &mut tab_writer,
            "{}\t{}\t{}\t{}\t{}\t{}",
            device.id,
            device.pool,
            device.namespace,
            device.image,
            device.snapshot,
            device.dev_path().display()
        )?;
    }
    tab_writer.flush()?;
    Ok(())
}

/// lists all mapped rbd devices
pub fn list(args: List, bus: &KrbdBus) -> Result<()> {
    let devices = bus
        .devices()
        .with_context(|| format!("failed to list devices under {:?}", bus.root()))?;

    match args.format.as_str() {
        "table" => write_table(io::stdout(), &devices),
        "json" => {
            println!("{}", serde_json::to_string_pretty(&devices)?);
            Ok(())
        }
        unknown => bail!("unknown format: {unknown}"),
    }
}
