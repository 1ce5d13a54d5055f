/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod candidates;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod signaling;
pub mod webrtc_engine;

pub use controller::CallController;
pub use error::{EngineError, ErrorKind, SessionError};
pub use session::{Role, SessionEvent, SessionSnapshot, SessionState};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
