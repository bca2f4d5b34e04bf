use std::io;

use anyhow::Result;
use clap::{Command, Parser};
use clap_complete::{generate, Generator, Shell};

#[derive(Debug, Parser)]
/// Generate scripts for shell completion
pub struct Completion {
    #[clap(long = "generator", short = 'g', value_enum)]
    pub generator: Shell,
}

pub fn completion(args: Completion, app: &mut Command) -> Result<()> {
    generate_completions(args.generator, app, &mut io::stdout());
    Ok(())
}

fn generate_completions<G: Generator>(gen: G, app: &mut Command, out: &mut dyn io::Write) {
    let name = app.get_name().to_string();
    generate(gen, app, name, out);
}
