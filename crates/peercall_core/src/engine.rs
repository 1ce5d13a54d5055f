/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Boundary to the media stack: the negotiation engine that produces and
//! consumes descriptions/candidates, and the sink that renders remote media.

use async_trait::async_trait;
use peercall_protocol::{IceCandidate, SessionDescription};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStep {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
}

impl NegotiationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStep::CreateOffer => "create_offer",
            NegotiationStep::CreateAnswer => "create_answer",
            NegotiationStep::SetLocalDescription => "set_local_description",
            NegotiationStep::SetRemoteDescription => "set_remote_description",
            NegotiationStep::AddIceCandidate => "add_ice_candidate",
        }
    }
}

impl std::fmt::Display for NegotiationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call into the engine, as decided by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription(SessionDescription),
    SetRemoteDescription(SessionDescription),
    AddIceCandidate(IceCandidate),
}

impl EngineCall {
    pub fn step(&self) -> NegotiationStep {
        match self {
            EngineCall::CreateOffer => NegotiationStep::CreateOffer,
            EngineCall::CreateAnswer => NegotiationStep::CreateAnswer,
            EngineCall::SetLocalDescription(_) => NegotiationStep::SetLocalDescription,
            EngineCall::SetRemoteDescription(_) => NegotiationStep::SetRemoteDescription,
            EngineCall::AddIceCandidate(_) => NegotiationStep::AddIceCandidate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Opaque reference to a remote media track handed to the frame sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaHandle {
    pub track_id: String,
    pub stream_id: String,
    pub kind: MediaKind,
}

/// Events the engine emits on its own schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    LocalCandidate(IceCandidate),
    RemoteStreamAdded(MediaHandle),
}

#[async_trait]
pub trait NegotiationEngine: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;
    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    /// Must be rejected by the engine when no remote description is set.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;
    /// Registers where engine events are delivered. Called once, before any negotiation call.
    fn attach(&self, events: mpsc::UnboundedSender<EngineEvent>);
    /// Releases engine resources. In-flight calls may still complete afterwards.
    async fn close(&self);
}

pub trait FrameSink: Send + Sync {
    fn render(&self, media: &MediaHandle);
    fn release(&self);
}

/// Frame sink that only logs; used when no renderer is bound.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FrameSink for TracingSink {
    fn render(&self, media: &MediaHandle) {
        info!(track = %media.track_id, stream = %media.stream_id, kind = ?media.kind, "remote media available");
    }

    fn release(&self) {
        info!("frame sink released");
    }
}

pub(crate) async fn execute(
    engine: &dyn NegotiationEngine,
    call: EngineCall,
) -> Result<Option<SessionDescription>, EngineError> {
    match call {
        EngineCall::CreateOffer => engine.create_offer().await.map(Some),
        EngineCall::CreateAnswer => engine.create_answer().await.map(Some),
        EngineCall::SetLocalDescription(desc) => engine.set_local_description(desc).await.map(|_| None),
        EngineCall::SetRemoteDescription(desc) => engine.set_remote_description(desc).await.map(|_| None),
        EngineCall::AddIceCandidate(cand) => engine.add_ice_candidate(cand).await.map(|_| None),
    }
}
