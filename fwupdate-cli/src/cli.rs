// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "fwupdate-cli")]
#[command(about = "Firmware-update engine command-line front end")]
pub struct Cli {
    /// Engine deployment config (product type, system shape, state dir)
    #[arg(short, long, default_value = "/etc/fwupdate/engine.toml")]
    pub config: PathBuf,

    /// Partition-name to `/dev/mtdN` map
    #[arg(short, long, default_value = "/etc/fwupdate/devices.toml")]
    pub devices: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Stream a CWE package into the passive slot (or swifota staging
    /// partition), resuming from any prior checkpoint
    Download {
        /// CWE package file, or `-` for stdin
        #[arg(value_name = "FILE")]
        package: PathBuf,
    },

    /// Report the byte offset a resumed download would start from
    ResumePosition,

    /// Finalize a completed download: request the A/B swap (dual-system)
    /// or reboot into the staged image (single-system)
    Install {
        /// Mark the new system good immediately instead of waiting for a
        /// separate `mark-good` after reboot
        #[arg(long)]
        mark_good: bool,
    },

    /// Commit a successful boot onto the new system
    MarkGood {
        #[arg(long, default_value_t = 0)]
        corrected: u32,
        #[arg(long, default_value_t = 0)]
        failed: u32,
        #[arg(long, default_value_t = 0)]
        bad_blocks: u32,
    },

    /// Report the current internal status and its label
    Status,

    /// Set or clear bits in the bad-image bitmap
    SetBadImage {
        /// Bitmask over the 64 image kinds, e.g. 0x200 for MODEM1
        #[arg(value_name = "MASK")]
        mask: u64,
        /// Clear the given bits instead of setting them
        #[arg(long)]
        clear: bool,
    },

    /// Report which side (1 or 2) of each partition group is active
    GetSystem,

    /// Set the active side of one or more partition groups
    SetSystem {
        #[arg(long)]
        modem: Option<u8>,
        #[arg(long)]
        lk: Option<u8>,
        #[arg(long)]
        linux: Option<u8>,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Download { package } => commands::download(&cli.config, &cli.devices, &package),
        Commands::ResumePosition => commands::resume_position(&cli.config),
        Commands::Install { mark_good } => commands::install(&cli.config, &cli.devices, mark_good),
        Commands::MarkGood {
            corrected,
            failed,
            bad_blocks,
        } => commands::mark_good(&cli.config, corrected, failed, bad_blocks),
        Commands::Status => commands::status(&cli.config),
        Commands::SetBadImage { mask, clear } => commands::set_bad_image(&cli.config, mask, clear),
        Commands::GetSystem => commands::get_system(&cli.config),
        Commands::SetSystem { modem, lk, linux } => {
            commands::set_system(&cli.config, modem, lk, linux)
        }
    }
}
