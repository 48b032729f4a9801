// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The production `Platform` collaborator: requests an A/B swap by
//! writing the bootloader's active-side marker, and reboots by shelling
//! out to the system `reboot` binary.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use fwupdate_engine::error::{EngineError, EngineResult};
use fwupdate_engine::platform::Platform;

pub struct ShellPlatform {
    active_side_marker: PathBuf,
}

impl ShellPlatform {
    pub fn new(state_dir: &str) -> Self {
        Self {
            active_side_marker: PathBuf::from(state_dir).join("active_side"),
        }
    }

    fn write_marker(&self, sync: bool) -> Result<()> {
        let contents = if sync { "new\n" } else { "new,desync\n" };
        fs::write(&self.active_side_marker, contents).with_context(|| {
            format!(
                "failed to write active-side marker {}",
                self.active_side_marker.display()
            )
        })
    }
}

impl Platform for ShellPlatform {
    fn request_swap(&mut self, sync: bool) -> EngineResult<()> {
        self.write_marker(sync)
            .map_err(|e| EngineError::Fault(e.to_string()))
    }

    fn reboot(&mut self) -> EngineResult<()> {
        let status = Command::new("reboot")
            .status()
            .map_err(EngineError::Io)?;
        if !status.success() {
            return Err(EngineError::Fault(format!(
                "reboot exited with {status}"
            )));
        }
        Ok(())
    }

    fn is_in_sync(&mut self) -> EngineResult<bool> {
        match fs::read_to_string(&self.active_side_marker) {
            Ok(contents) => Ok(!contents.contains("desync")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}
