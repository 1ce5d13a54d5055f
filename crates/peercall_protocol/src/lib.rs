/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

mod codec;

pub use codec::{decode, encode, CodecError, WireEvent};

/// Event names used on the rendezvous channel.
pub mod events {
    pub const READY: &str = "ready";
    pub const OFFER: &str = "offer";
    pub const ANSWER: &str = "answer";
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    /// Emitted by the connection itself once the namespace handshake completes.
    pub const CONNECT: &str = "connect";
    pub const CONNECT_ERROR: &str = "connect_error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IceCandidate {
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u32,
    pub candidate: String,
}

impl IceCandidate {
    pub fn new(sdp_mid: impl Into<String>, sdp_mline_index: u32, candidate: impl Into<String>) -> Self {
        Self {
            sdp_mid: sdp_mid.into(),
            sdp_mline_index,
            candidate: candidate.into(),
        }
    }
}

/// One signaling message. Messages carry no session identifier: ordering on the
/// channel is the only correlation between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    Ready,
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    ConnectedAck,
    ConnectionError(String),
}

impl SignalingMessage {
    /// Wire event name for this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalingMessage::Ready => events::READY,
            SignalingMessage::Offer(_) => events::OFFER,
            SignalingMessage::Answer(_) => events::ANSWER,
            SignalingMessage::IceCandidate(_) => events::ICE_CANDIDATE,
            SignalingMessage::ConnectedAck => events::CONNECT,
            SignalingMessage::ConnectionError(_) => events::CONNECT_ERROR,
        }
    }
}

impl std::fmt::Display for SignalingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalingMessage::Offer(d) | SignalingMessage::Answer(d) => {
                write!(f, "{} ({} bytes sdp)", self.event_name(), d.sdp.len())
            }
            SignalingMessage::IceCandidate(c) => {
                write!(f, "{} (mid={} idx={})", self.event_name(), c.sdp_mid, c.sdp_mline_index)
            }
            SignalingMessage::ConnectionError(reason) => write!(f, "{}: {reason}", self.event_name()),
            _ => f.write_str(self.event_name()),
        }
    }
}
