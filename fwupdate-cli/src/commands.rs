// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations. Each one loads the engine config fresh and
//! constructs a fresh `SystemState`: this binary is a single-shot
//! debug/ops front end, not the long-running process that would
//! otherwise keep `SystemState` resident across calls.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use fwupdate_engine::config::EngineConfig;
use fwupdate_engine::flash::EccStats;
use fwupdate_engine::session::{DownloadOutcome, DownloadSession};
use fwupdate_engine::system::{PartitionGroup, SystemSide, SystemState};
use fwupdate_proto::BadImageMask;

use crate::platform::ShellPlatform;
use crate::resolver::{load_device_map, MtdResolver};

fn load_config(path: &Path) -> Result<EngineConfig> {
    EngineConfig::from_file(path)
        .with_context(|| format!("failed to load engine config {}", path.display()))
}

pub fn download(config_path: &Path, devices_path: &Path, package: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let devices = load_device_map(devices_path)?;
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);
    let mut resolver = MtdResolver::new(devices, config.shape);

    session.init_download().context("init_download failed")?;

    let mut input: Box<dyn Read> = if package == Path::new("-") {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(package).with_context(|| format!("failed to open {}", package.display()))?)
    };

    // The stream parser's read loop lives inside `DownloadSession::download`,
    // so this can only show a spinner, not a byte-accurate bar.
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {elapsed_precise} downloading...")?);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let outcome = session
        .download(&mut *input, &mut resolver)
        .context("download failed")?;

    pb.finish_and_clear();

    match outcome {
        DownloadOutcome::Completed => {
            println!("Download complete.");
        }
        DownloadOutcome::Suspended { resume_position } => {
            println!("Download suspended at byte offset {resume_position}.");
            println!("Re-run with the same package starting from that offset to resume.");
        }
    }
    Ok(())
}

pub fn resume_position(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);
    println!("{}", session.get_resume_position());
    Ok(())
}

pub fn install(config_path: &Path, devices_path: &Path, mark_good: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let devices = load_device_map(devices_path)?;
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);
    let mut platform = ShellPlatform::new(&config.state_dir);
    let mut resolver = MtdResolver::new(devices, config.shape);

    session
        .install(mark_good, &mut platform, &mut resolver)
        .context("install failed")?;

    let (status, label) = session.get_update_status();
    println!("{label} ({status:?})");
    Ok(())
}

pub fn mark_good(config_path: &Path, corrected: u32, failed: u32, bad_blocks: u32) -> Result<()> {
    let config = load_config(config_path)?;
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);

    let ecc = EccStats {
        corrected,
        failed,
        bad_blocks,
    };
    match session.mark_good(ecc) {
        Ok(()) => {
            println!("System marked good.");
            Ok(())
        }
        Err(e) => bail!("mark-good refused: {e}"),
    }
}

pub fn status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);
    let (status, label) = session.get_update_status();
    println!("{label} ({status:?})");
    Ok(())
}

pub fn set_bad_image(config_path: &Path, mask: u64, clear: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let system = SystemState::new();
    let session = DownloadSession::new(&config, &system);
    session.set_bad_image(BadImageMask(mask), !clear);
    println!("{} mask {mask:#010x}", if clear { "Cleared" } else { "Set" });
    Ok(())
}

pub fn get_system(config_path: &Path) -> Result<()> {
    let _config = load_config(config_path)?;
    let system = SystemState::new();
    let sides = system.get_system();
    println!("modem: {}", side_label(sides[0]));
    println!("lk:    {}", side_label(sides[1]));
    println!("linux: {}", side_label(sides[2]));
    Ok(())
}

pub fn set_system(
    config_path: &Path,
    modem: Option<u8>,
    lk: Option<u8>,
    linux: Option<u8>,
) -> Result<()> {
    let _config = load_config(config_path)?;
    let system = SystemState::new();

    let current = system.get_system();
    let groups = [
        (PartitionGroup::Modem, side_or(current[0], modem)?),
        (PartitionGroup::Lk, side_or(current[1], lk)?),
        (PartitionGroup::Linux, side_or(current[2], linux)?),
    ];
    system.set_system(groups);
    println!("Updated.");
    Ok(())
}

fn side_label(side: SystemSide) -> &'static str {
    match side {
        SystemSide::One => "1",
        SystemSide::Two => "2",
    }
}

fn side_or(current: SystemSide, requested: Option<u8>) -> Result<SystemSide> {
    match requested {
        None => Ok(current),
        Some(1) => Ok(SystemSide::One),
        Some(2) => Ok(SystemSide::Two),
        Some(other) => bail!("invalid side {other}: must be 1 or 2"),
    }
}
