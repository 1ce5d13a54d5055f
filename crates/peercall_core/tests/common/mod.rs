/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use peercall_core::engine::{EngineCall, EngineEvent, FrameSink, MediaHandle, NegotiationEngine};
use peercall_core::error::{EngineError, SessionError};
use peercall_core::orchestrator::{self, OrchestratorHandle};
use peercall_core::session::{SessionEvent, SessionState};
use peercall_core::signaling::{ChannelEvent, Signaling};
use peercall_protocol::{IceCandidate, SessionDescription, SignalingMessage};
use tokio::sync::{broadcast, mpsc, Notify};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn stub_offer() -> SessionDescription {
    SessionDescription::offer("v=0\r\no=- 100 1 IN IP4 127.0.0.1\r\ns=stub-offer\r\n")
}

pub fn stub_answer() -> SessionDescription {
    SessionDescription::answer("v=0\r\no=- 200 1 IN IP4 127.0.0.1\r\ns=stub-answer\r\n")
}

/// Shared record of teardown steps across the engine, sink and signaling stubs.
pub type TeardownLog = Arc<Mutex<Vec<&'static str>>>;

pub fn cand(n: u32) -> IceCandidate {
    IceCandidate::new("0", 0, format!("candidate:{n} 1 UDP 2130706431 192.168.1.{n} 5000 typ host"))
}

/// Engine that records every call and enforces remote-before-candidate.
#[derive(Default)]
pub struct StubEngine {
    calls: Mutex<Vec<EngineCall>>,
    remote_set: AtomicBool,
    candidate_too_early: AtomicBool,
    reject_remote: AtomicBool,
    closed: AtomicBool,
    hold_candidates: AtomicBool,
    gate: Notify,
    teardown: TeardownLog,
    events: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
}

impl StubEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn candidate_too_early(&self) -> bool {
        self.candidate_too_early.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reject_remote_descriptions(&self) {
        self.reject_remote.store(true, Ordering::SeqCst);
    }

    /// Parks every `add_ice_candidate` until `release_candidates` is called.
    pub fn hold_candidates(&self) {
        self.hold_candidates.store(true, Ordering::SeqCst);
    }

    pub fn release_candidates(&self) {
        self.gate.notify_waiters();
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NegotiationEngine for StubEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        self.record(EngineCall::CreateOffer);
        Ok(stub_offer())
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        self.record(EngineCall::CreateAnswer);
        Ok(stub_answer())
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.record(EngineCall::SetLocalDescription(desc));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.record(EngineCall::SetRemoteDescription(desc));
        if self.reject_remote.load(Ordering::SeqCst) {
            return Err(EngineError::new("remote description rejected"));
        }
        self.remote_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.record(EngineCall::AddIceCandidate(candidate));
        if self.hold_candidates.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if !self.remote_set.load(Ordering::SeqCst) {
            self.candidate_too_early.store(true, Ordering::SeqCst);
            return Err(EngineError::new("no remote description"));
        }
        Ok(())
    }

    fn attach(&self, events: mpsc::UnboundedSender<EngineEvent>) {
        *self.events.lock().unwrap() = Some(events);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.teardown.lock().unwrap().push("engine.close");
    }
}

/// Signaling stand-in that hands every sent message to the test.
pub struct Loopback {
    sent: mpsc::UnboundedSender<SignalingMessage>,
    fail_sends: AtomicBool,
    disconnected: AtomicBool,
    teardown: TeardownLog,
}

impl Loopback {
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signaling for Loopback {
    fn send(&self, msg: SignalingMessage) -> Result<(), SessionError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::transport("loopback refused"));
        }
        let _ = self.sent.send(msg);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.teardown.lock().unwrap().push("signaling.disconnect");
    }
}

#[derive(Default)]
pub struct RecordingSink {
    rendered: Mutex<Vec<MediaHandle>>,
    released: AtomicBool,
    teardown: TeardownLog,
}

impl RecordingSink {
    pub fn rendered(&self) -> Vec<MediaHandle> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl FrameSink for RecordingSink {
    fn render(&self, media: &MediaHandle) {
        self.rendered.lock().unwrap().push(media.clone());
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.teardown.lock().unwrap().push("sink.release");
    }
}

pub struct Harness {
    pub engine: Arc<StubEngine>,
    pub signaling: Arc<Loopback>,
    pub sink: Arc<RecordingSink>,
    pub teardown: TeardownLog,
    pub inbound: mpsc::UnboundedSender<ChannelEvent>,
    pub outbound: mpsc::UnboundedReceiver<SignalingMessage>,
    pub events: broadcast::Receiver<SessionEvent>,
    pub handle: OrchestratorHandle,
}

impl Harness {
    pub fn start() -> Self {
        let teardown = TeardownLog::default();
        let engine = Arc::new(StubEngine {
            teardown: teardown.clone(),
            ..StubEngine::default()
        });
        let (sent_tx, outbound) = mpsc::unbounded_channel();
        let signaling = Arc::new(Loopback {
            sent: sent_tx,
            fail_sends: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            teardown: teardown.clone(),
        });
        let sink = Arc::new(RecordingSink {
            teardown: teardown.clone(),
            ..RecordingSink::default()
        });
        let (inbound, channel_events) = mpsc::unbounded_channel();
        let handle = orchestrator::spawn(engine.clone(), signaling.clone(), sink.clone(), channel_events);
        let events = handle.subscribe();
        Self {
            engine,
            signaling,
            sink,
            teardown,
            inbound,
            outbound,
            events,
            handle,
        }
    }

    pub fn teardown_steps(&self) -> Vec<&'static str> {
        self.teardown.lock().unwrap().clone()
    }

    pub fn deliver(&self, msg: SignalingMessage) {
        self.inbound.send(ChannelEvent::Message(msg)).unwrap();
    }

    pub async fn next_sent(&mut self) -> SignalingMessage {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for an outbound message")
            .expect("loopback closed")
    }

    pub async fn wait_state(&self, state: SessionState) {
        let mut rx = self.handle.watch();
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.state == state))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
            .expect("session task gone");
    }

    /// Waits for the first event matching `pred`, skipping others.
    pub async fn wait_event(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                let ev = self.events.recv().await.expect("event stream ended");
                if pred(&ev) {
                    return ev;
                }
            }
        })
        .await
        .expect("timed out waiting for session event")
    }
}
