// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Deployment configuration: product type, dual- vs single-system shape,
//! device paths, and chunk sizing. Loaded from a TOML file at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemShape {
    DualSystem,
    SingleSystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Build-time expected `product_type` field in every CWE header.
    pub product_type: u32,
    pub shape: SystemShape,
    /// Bytes read per `download()` chunk when not bound by a shorter
    /// header/patch-meta/slice-header read.
    pub chunk_size: usize,
    /// Whether `init_download` may proceed while the two systems are
    /// desynced.
    pub disable_sync_before_update: bool,
    /// Directory holding `dwl_status.nfo` and the two resume-context files.
    pub state_dir: String,
    /// Path to the scratch file used while staging a delta patch slice.
    pub patch_scratch_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            product_type: 0,
            shape: SystemShape::DualSystem,
            chunk_size: 64 * 1024,
            disable_sync_before_update: false,
            state_dir: "/data/fwupdate".to_string(),
            patch_scratch_path: "/data/fwupdate/patch.scratch".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(EngineError::Io)?;
        toml::from_str(&text).map_err(|e| EngineError::Fault(format!("invalid config: {e}")))
    }

    pub fn resume_ctx_paths(&self) -> (String, String) {
        (
            format!("{}/fwupdate_ResumeCtx_0", self.state_dir),
            format!("{}/fwupdate_ResumeCtx_1", self.state_dir),
        )
    }

    pub fn status_file_path(&self) -> String {
        format!("{}/dwl_status.nfo", self.state_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_dual_system() {
        assert_eq!(EngineConfig::default().shape, SystemShape::DualSystem);
    }

    #[test]
    fn parses_toml() {
        let toml_text = r#"
            product_type = 305419896
            shape = "single_system"
            chunk_size = 32768
        "#;
        let cfg: EngineConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.product_type, 0x1234_5678);
        assert_eq!(cfg.shape, SystemShape::SingleSystem);
        assert_eq!(cfg.chunk_size, 32768);
        assert_eq!(cfg.state_dir, EngineConfig::default().state_dir);
    }

    #[test]
    fn resume_ctx_paths_are_under_state_dir() {
        let cfg = EngineConfig {
            state_dir: "/tmp/fw".into(),
            ..EngineConfig::default()
        };
        let (a, b) = cfg.resume_ctx_paths();
        assert_eq!(a, "/tmp/fw/fwupdate_ResumeCtx_0");
        assert_eq!(b, "/tmp/fw/fwupdate_ResumeCtx_1");
    }
}
