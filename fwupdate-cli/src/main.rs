// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line front end for the firmware-update engine.
//!
//! Usage:
//!   fwupdate-cli --config engine.toml --devices devices.toml download pkg.cwe
//!   fwupdate-cli --config engine.toml status
//!   fwupdate-cli --config engine.toml install --mark-good

mod cli;
mod commands;
mod platform;
mod resolver;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}
