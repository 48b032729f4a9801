// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Resume context manager (C6): persists the download checkpoint as two
//! redundant files with alternating counters, so a crash mid-save never
//! loses both copies.

use std::fs;
use std::path::{Path, PathBuf};

use fwupdate_proto::ResumeContext;

use crate::error::{EngineError, EngineResult};

pub struct ResumeManager {
    path_a: PathBuf,
    path_b: PathBuf,
}

impl ResumeManager {
    pub fn new(path_a: impl Into<PathBuf>, path_b: impl Into<PathBuf>) -> Self {
        Self {
            path_a: path_a.into(),
            path_b: path_b.into(),
        }
    }

    /// Writes to whichever of the two files currently holds the lower
    /// (or absent) counter, via write-to-temp-then-rename so the target
    /// path is never observed partially written.
    pub fn save(&self, ctx: &ResumeContext) -> EngineResult<()> {
        let target = self.file_to_overwrite(ctx.ctx_counter)?;
        let encoded = ctx.encode()?;
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, &encoded).map_err(EngineError::Io)?;
        fs::rename(&tmp, &target).map_err(EngineError::Io)?;
        Ok(())
    }

    /// Picks whichever of the two files currently holds the lower (or
    /// absent) valid counter — ensures saves keep alternating between the
    /// two files indefinitely, instead of converging on one of them.
    fn file_to_overwrite(&self, new_counter: u32) -> EngineResult<PathBuf> {
        let _ = new_counter;
        let a = read_valid(&self.path_a);
        let b = read_valid(&self.path_b);
        match (a, b) {
            (Some(a), Some(b)) if a.ctx_counter <= b.ctx_counter => Ok(self.path_a.clone()),
            (Some(_), Some(_)) => Ok(self.path_b.clone()),
            (Some(_), None) => Ok(self.path_b.clone()),
            (None, Some(_)) => Ok(self.path_a.clone()),
            (None, None) => Ok(self.path_a.clone()),
        }
    }

    /// Returns the file with the higher valid `ctx_counter`; `None` if
    /// both are absent or corrupt.
    pub fn load(&self) -> Option<ResumeContext> {
        let a = read_valid(&self.path_a);
        let b = read_valid(&self.path_b);
        match (a, b) {
            (Some(a), Some(b)) => Some(if a.ctx_counter >= b.ctx_counter { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// The byte offset in the source stream from which the next download
    /// must resume: the total bytes already accepted into the global CRC.
    pub fn resume_position(&self) -> u64 {
        self.load().map(|ctx| ctx.total_read).unwrap_or(0)
    }

    pub fn clear(&self) -> EngineResult<()> {
        for path in [&self.path_a, &self.path_b] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::Io(e)),
            }
        }
        Ok(())
    }
}

fn read_valid(path: &Path) -> Option<ResumeContext> {
    let bytes = fs::read(path).ok()?;
    ResumeContext::parse(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(counter: u32) -> ResumeContext {
        ResumeContext {
            ctx_counter: counter,
            image_type: 0x5553_4552,
            image_size: 1024,
            image_crc: 1,
            current_image_crc: 1,
            global_crc: 2,
            current_global_crc: 2,
            total_read: 512,
            current_offset: 0,
            full_image_length: 1024,
            misc_opts: 0,
            is_first_nvup_downloaded: false,
            is_modem_downloaded: false,
            is_image_to_be_read: false,
            patch_meta: None,
            patch_slices: Vec::new(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mgr = ResumeManager::new(dir.path().join("ctx0"), dir.path().join("ctx1"));
        mgr.save(&sample(1)).unwrap();
        let loaded = mgr.load().unwrap();
        assert_eq!(loaded.ctx_counter, 1);
        assert_eq!(loaded.total_read, 512);
    }

    #[test]
    fn later_save_alternates_files_and_wins() {
        let dir = tempdir().unwrap();
        let mgr = ResumeManager::new(dir.path().join("ctx0"), dir.path().join("ctx1"));
        mgr.save(&sample(1)).unwrap();
        mgr.save(&sample(2)).unwrap();
        let loaded = mgr.load().unwrap();
        assert_eq!(loaded.ctx_counter, 2);
    }

    #[test]
    fn alternation_survives_a_third_and_fourth_save() {
        let dir = tempdir().unwrap();
        let path_a = dir.path().join("ctx0");
        let path_b = dir.path().join("ctx1");
        let mgr = ResumeManager::new(path_a.clone(), path_b.clone());
        mgr.save(&sample(1)).unwrap();
        mgr.save(&sample(2)).unwrap();
        mgr.save(&sample(3)).unwrap();
        assert_eq!(
            ResumeContext::parse(&fs::read(&path_a).unwrap()).unwrap().ctx_counter,
            3
        );
        mgr.save(&sample(4)).unwrap();
        assert_eq!(
            ResumeContext::parse(&fs::read(&path_b).unwrap()).unwrap().ctx_counter,
            4
        );
        assert_eq!(mgr.load().unwrap().ctx_counter, 4);
    }

    #[test]
    fn both_corrupt_yields_no_resume() {
        let dir = tempdir().unwrap();
        let path_a = dir.path().join("ctx0");
        let path_b = dir.path().join("ctx1");
        fs::write(&path_a, b"garbage").unwrap();
        fs::write(&path_b, b"also garbage").unwrap();
        let mgr = ResumeManager::new(path_a, path_b);
        assert!(mgr.load().is_none());
    }

    #[test]
    fn clear_removes_both_files() {
        let dir = tempdir().unwrap();
        let mgr = ResumeManager::new(dir.path().join("ctx0"), dir.path().join("ctx1"));
        mgr.save(&sample(1)).unwrap();
        mgr.clear().unwrap();
        assert!(mgr.load().is_none());
    }

    #[test]
    fn resume_position_reflects_total_read() {
        let dir = tempdir().unwrap();
        let mgr = ResumeManager::new(dir.path().join("ctx0"), dir.path().join("ctx1"));
        assert_eq!(mgr.resume_position(), 0);
        mgr.save(&sample(1)).unwrap();
        assert_eq!(mgr.resume_position(), 512);
    }
}
