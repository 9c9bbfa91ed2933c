//! Renders the `schc-gateway` manual page from the clap definition.
//!
//! The page lands in `target/generated-man` unless `SCHC_GATEWAY_MAN_DIR`
//! names another directory.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

const MAN_DIR_VAR: &str = "SCHC_GATEWAY_MAN_DIR";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed={MAN_DIR_VAR}");

    let man_dir = env::var_os(MAN_DIR_VAR)
        .map_or_else(|| PathBuf::from("target/generated-man"), PathBuf::from);
    fs::create_dir_all(&man_dir)?;

    let cmd = cli::Cli::command();
    let page = man_dir.join(format!("{}.1", cmd.get_name()));
    let mut rendered = Vec::new();
    Man::new(cmd).render(&mut rendered)?;
    fs::write(page, rendered)?;

    Ok(())
}
