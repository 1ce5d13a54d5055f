/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use peercall_protocol::CodecError;
use serde::Serialize;
use thiserror::Error;

use crate::engine::NegotiationStep;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Protocol,
    Negotiation,
    State,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Channel connect/send/disconnect failures.
    #[error("transport error: {0}")]
    Transport(String),
    /// Malformed or out-of-sequence signaling message.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The negotiation engine rejected a description or candidate.
    #[error("negotiation failed at {step}: {reason}")]
    Negotiation { step: NegotiationStep, reason: String },
    /// Operation requested in a state that forbids it.
    #[error("`{operation}` is not allowed while {state}")]
    State {
        operation: &'static str,
        state: SessionState,
    },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::Protocol(_) => ErrorKind::Protocol,
            SessionError::Negotiation { .. } => ErrorKind::Negotiation,
            SessionError::State { .. } => ErrorKind::State,
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        SessionError::Transport(reason.into())
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        SessionError::Protocol(reason.into())
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::Protocol(e.to_string())
    }
}

/// Rejection reported by a negotiation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
