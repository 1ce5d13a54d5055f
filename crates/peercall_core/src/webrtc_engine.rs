/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use peercall_protocol::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use crate::config::EngineConfig;
use crate::engine::{EngineEvent, MediaHandle, MediaKind, NegotiationEngine};
use crate::error::EngineError;

/// Negotiation engine backed by a `webrtc` peer connection with send/receive
/// audio and video transceivers. Capture and rendering are left to the host.
pub struct WebrtcEngine {
    pc: Arc<RTCPeerConnection>,
}

impl WebrtcEngine {
    pub async fn new(cfg: &EngineConfig) -> Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().context("register default codecs")?;
        let api = APIBuilder::new().with_media_engine(media).build();
        let pc = api
            .new_peer_connection(RTCConfiguration {
                ice_servers: build_ice_servers(cfg),
                ..Default::default()
            })
            .await
            .context("new peer connection")?;
        if cfg.audio {
            pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
                .await
                .context("add audio transceiver")?;
        }
        if cfg.video {
            pc.add_transceiver_from_kind(RTPCodecType::Video, None)
                .await
                .context("add video transceiver")?;
        }
        info!(ice = ?cfg.ice_urls, audio = cfg.audio, video = cfg.video, "peer connection ready");
        Ok(Self { pc: Arc::new(pc) })
    }
}

fn build_ice_servers(cfg: &EngineConfig) -> Vec<RTCIceServer> {
    if cfg.ice_urls.is_empty() {
        return Vec::new();
    }
    vec![RTCIceServer {
        urls: cfg.ice_urls.clone(),
        username: cfg.ice_username.clone().unwrap_or_default(),
        credential: cfg.ice_credential.clone().unwrap_or_default(),
        ..Default::default()
    }]
}

fn engine_err(e: webrtc::Error) -> EngineError {
    EngineError::new(e.to_string())
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    match desc.sdp_type {
        peercall_protocol::SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        peercall_protocol::SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    }
    .map_err(engine_err)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, EngineError> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(EngineError::new(format!("unsupported description type {other:?}"))),
    }
}

fn to_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate::new(
        init.sdp_mid.unwrap_or_default(),
        init.sdp_mline_index.map(u32::from).unwrap_or(0),
        init.candidate,
    )
}

fn media_kind(kind: RTPCodecType) -> MediaKind {
    match kind {
        RTPCodecType::Audio => MediaKind::Audio,
        _ => MediaKind::Video,
    }
}

#[async_trait]
impl NegotiationEngine for WebrtcEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        let offer = self.pc.create_offer(None).await.map_err(engine_err)?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self.pc.create_answer(None).await.map_err(engine_err)?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.pc
            .set_local_description(to_rtc(desc)?)
            .await
            .map_err(engine_err)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.pc
            .set_remote_description(to_rtc(desc)?)
            .await
            .map_err(engine_err)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        let sdp_mline_index = u16::try_from(candidate.sdp_mline_index)
            .map_err(|_| EngineError::new(format!("sdpMLineIndex {} out of range", candidate.sdp_mline_index)))?;
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(sdp_mline_index),
            username_fragment: None,
        };
        self.pc.add_ice_candidate(init).await.map_err(engine_err)
    }

    fn attach(&self, events: mpsc::UnboundedSender<EngineEvent>) {
        let tx = events.clone();
        self.pc.on_ice_candidate(Box::new(move |cand| {
            let tx = tx.clone();
            Box::pin(async move {
                let Some(cand) = cand else {
                    debug!("local candidate gathering complete");
                    return;
                };
                match cand.to_json() {
                    Ok(init) => {
                        let _ = tx.send(EngineEvent::LocalCandidate(to_candidate(init)));
                    }
                    Err(e) => warn!("local candidate encode failed: {e:#}"),
                }
            })
        }));

        let tx = events;
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = tx.clone();
            Box::pin(async move {
                let media = MediaHandle {
                    track_id: track.id(),
                    stream_id: track.stream_id(),
                    kind: media_kind(track.kind()),
                };
                let _ = tx.send(EngineEvent::RemoteStreamAdded(media));
            })
        }));
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!("peer connection close failed: {e:#}");
        }
    }
}
