/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::CallConfig;
use crate::engine::{FrameSink, NegotiationEngine};
use crate::error::SessionError;
use crate::metrics::{MetricsSnapshot, SignalingMetrics};
use crate::orchestrator::{self, OrchestratorHandle};
use crate::session::{SessionEvent, SessionSnapshot};
use crate::signaling::SignalingChannel;

/// One call: the signaling channel wired to an orchestrated session.
pub struct CallController {
    channel: Arc<SignalingChannel>,
    session: OrchestratorHandle,
    metrics: Arc<SignalingMetrics>,
}

impl CallController {
    /// Wires everything up without connecting, so callers can subscribe first.
    pub fn new(cfg: &CallConfig, engine: Arc<dyn NegotiationEngine>, sink: Arc<dyn FrameSink>) -> Result<Self> {
        let metrics = Arc::new(SignalingMetrics::new());
        let channel = Arc::new(SignalingChannel::new(cfg.signaling()?, metrics.clone()));
        let channel_events = channel
            .subscribe()
            .context("signaling channel already has a subscriber")?;
        let session = orchestrator::spawn(engine, channel.clone(), sink, channel_events);
        Ok(Self {
            channel,
            session,
            metrics,
        })
    }

    pub fn start(cfg: &CallConfig, engine: Arc<dyn NegotiationEngine>, sink: Arc<dyn FrameSink>) -> Result<Self> {
        let controller = Self::new(cfg, engine, sink)?;
        controller.connect()?;
        Ok(controller)
    }

    pub fn connect(&self) -> Result<()> {
        self.channel.connect().context("connect signaling channel")?;
        info!("call controller started");
        Ok(())
    }

    /// Announces presence to the peer; the session role is decided by what arrives next.
    pub async fn start_call(&self) -> Result<(), SessionError> {
        self.session.signal_ready().await
    }

    /// Ends the call and waits for engine, sink and channel to be released.
    pub async fn hang_up(&self) {
        self.session.hang_up();
        self.session.closed().await;
    }

    pub async fn closed(&self) {
        self.session.closed().await;
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn session(&self) -> &OrchestratorHandle {
        &self.session
    }
}
