// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core firmware-update engine: CWE container parsing, the delta patch
//! engine, raw-flash/UBI partition writers, the resume checkpoint
//! manager, and the system state / install-swap orchestrator.
//!
//! Nothing here talks to a transport or a CLI; [`session::DownloadSession`]
//! is the entry point a caller drives with bytes from wherever they come
//! from (a modem AT channel, a file, a socket) and a [`session::DeviceResolver`]
//! impl that knows how to open the right MTD/UBI device for a given
//! [`fwupdate_proto::ImageKind`].

pub mod config;
pub mod cwe;
pub mod error;
pub mod flash;
pub mod partmap;
pub mod patch;
pub mod platform;
pub mod resume;
pub mod session;
pub mod stream;
pub mod system;
pub mod writer;

pub use config::{EngineConfig, SystemShape};
pub use error::{EngineError, EngineResult};
pub use session::{DeviceResolver, DownloadOutcome, DownloadSession};
pub use system::SystemState;
