/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use async_trait::async_trait;
use peercall_protocol::{CodecError, SignalingMessage};

use crate::error::SessionError;

mod backoff;
pub mod channel;
pub mod socketio;

pub use backoff::Backoff;
pub use channel::SignalingChannel;

/// What the channel reports to its single subscriber, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(SignalingMessage),
    Disconnected,
    SendFailed(String),
    Malformed(CodecError),
}

/// Outbound half of the signaling channel as seen by the orchestrator.
#[async_trait]
pub trait Signaling: Send + Sync {
    fn send(&self, msg: SignalingMessage) -> Result<(), SessionError>;
    /// After this returns no further events reach the subscriber.
    async fn disconnect(&self);
}
