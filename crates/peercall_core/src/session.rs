/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Negotiation state machine. Performs no I/O: every input returns the
//! actions the orchestrator must carry out, in order.

use peercall_protocol::{events, CodecError, IceCandidate, SdpType, SessionDescription, SignalingMessage};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::candidates::CandidateBuffer;
use crate::engine::{EngineCall, EngineEvent, MediaHandle, NegotiationStep};
use crate::error::{EngineError, SessionError};
use crate::signaling::ChannelEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Readying,
    Offering,
    AwaitingAnswer,
    Answering,
    Connected,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Readying => "readying",
            SessionState::Offering => "offering",
            SessionState::AwaitingAnswer => "awaiting_answer",
            SessionState::Answering => "answering",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// States in which losing the channel leaves the negotiation unfinishable.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            SessionState::Readying
                | SessionState::Offering
                | SessionState::AwaitingAnswer
                | SessionState::Answering
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Unset,
    Caller,
    Callee,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Unset => "unset",
            Role::Caller => "caller",
            Role::Callee => "callee",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    RoleAssigned(Role),
    SignalingConnected,
    SignalingDisconnected,
    RemoteMedia(MediaHandle),
    Warning(SessionError),
    Failed(SessionError),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(SignalingMessage),
    Call(EngineCall),
    Render(MediaHandle),
    Emit(SessionEvent),
    /// Dispose engine, sink and channel. Always the last action of a batch.
    Teardown,
}

/// Completion of an engine call, tagged with the session that issued it.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub session: SessionId,
    pub step: NegotiationStep,
    pub result: Result<Option<SessionDescription>, EngineError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub role: Role,
    pub state: SessionState,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub pending_local: usize,
    pub pending_remote: usize,
}

pub struct Session {
    id: SessionId,
    role: Role,
    state: SessionState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    // created or received, commit still in flight
    staged_local: Option<SessionDescription>,
    staged_remote: Option<SessionDescription>,
    awaiting: Option<NegotiationStep>,
    pending_local: CandidateBuffer,
    pending_remote: CandidateBuffer,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::random(),
            role: Role::Unset,
            state: SessionState::Idle,
            local_description: None,
            remote_description: None,
            staged_local: None,
            staged_remote: None,
            awaiting: None,
            pending_local: CandidateBuffer::new(),
            pending_remote: CandidateBuffer::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            role: self.role,
            state: self.state,
            local_description: self.local_description.clone(),
            remote_description: self.remote_description.clone(),
            pending_local: self.pending_local.len(),
            pending_remote: self.pending_remote.len(),
        }
    }

    pub fn signal_ready(&mut self) -> Result<Vec<Action>, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::State {
                operation: "signal_ready",
                state: self.state,
            });
        }
        let mut out = Vec::new();
        self.transition(SessionState::Readying, &mut out);
        out.push(Action::Send(SignalingMessage::Ready));
        Ok(out)
    }

    pub fn hang_up(&mut self) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        info!(session = %self.id, state = %self.state, "hanging up");
        self.dispose();
        let mut out = Vec::new();
        self.transition(SessionState::Closed, &mut out);
        out.push(Action::Emit(SessionEvent::Closed));
        out.push(Action::Teardown);
        out
    }

    pub fn on_channel_event(&mut self, event: ChannelEvent) -> Vec<Action> {
        if self.state.is_terminal() {
            debug!(?event, state = %self.state, "ignoring signaling event after termination");
            return Vec::new();
        }
        match event {
            ChannelEvent::Message(msg) => self.on_message(msg),
            ChannelEvent::Disconnected => {
                let mut out = vec![Action::Emit(SessionEvent::SignalingDisconnected)];
                out.extend(self.on_transport_error(SessionError::transport("signaling channel disconnected")));
                out
            }
            ChannelEvent::SendFailed(reason) => self.fail(SessionError::transport(format!("send failed: {reason}"))),
            ChannelEvent::Malformed(err) => self.on_malformed(err),
        }
    }

    pub fn on_engine_event(&mut self, event: EngineEvent) -> Vec<Action> {
        if self.state.is_terminal() {
            debug!(?event, "ignoring engine event after termination");
            return Vec::new();
        }
        match event {
            EngineEvent::LocalCandidate(cand) => {
                if self.local_description.is_some() {
                    vec![Action::Send(SignalingMessage::IceCandidate(cand))]
                } else {
                    self.pending_local.push(cand);
                    debug!(pending = self.pending_local.len(), "local candidate buffered");
                    Vec::new()
                }
            }
            EngineEvent::RemoteStreamAdded(media) => {
                info!(track = %media.track_id, "remote stream added");
                vec![
                    Action::Render(media.clone()),
                    Action::Emit(SessionEvent::RemoteMedia(media)),
                ]
            }
        }
    }

    pub fn on_step_done(&mut self, outcome: StepOutcome) -> Vec<Action> {
        let StepOutcome { session, step, result } = outcome;
        if session != self.id {
            debug!(%session, %step, "discarding completion from another session");
            return Vec::new();
        }
        if self.state.is_terminal() {
            debug!(%step, state = %self.state, "discarding completion after termination");
            return Vec::new();
        }
        if step == NegotiationStep::AddIceCandidate {
            return match result {
                Ok(_) => Vec::new(),
                Err(e) => self.fail(SessionError::Negotiation { step, reason: e.0 }),
            };
        }
        if self.awaiting != Some(step) {
            warn!(%step, awaiting = ?self.awaiting, "unexpected negotiation completion");
            return Vec::new();
        }
        self.awaiting = None;
        let produced = match result {
            Ok(v) => v,
            Err(e) => return self.fail(SessionError::Negotiation { step, reason: e.0 }),
        };
        match step {
            NegotiationStep::CreateOffer | NegotiationStep::CreateAnswer => match produced {
                Some(desc) => self.stage_local(step, desc),
                None => self.fail(SessionError::Negotiation {
                    step,
                    reason: "engine returned no description".to_string(),
                }),
            },
            NegotiationStep::SetLocalDescription => self.local_committed(),
            NegotiationStep::SetRemoteDescription => self.remote_committed(),
            NegotiationStep::AddIceCandidate => Vec::new(),
        }
    }

    fn on_message(&mut self, msg: SignalingMessage) -> Vec<Action> {
        match msg {
            SignalingMessage::Ready => self.on_remote_ready(),
            SignalingMessage::Offer(desc) => self.on_offer(desc),
            SignalingMessage::Answer(desc) => self.on_answer(desc),
            SignalingMessage::IceCandidate(cand) => self.on_remote_candidate(cand),
            SignalingMessage::ConnectedAck => vec![Action::Emit(SessionEvent::SignalingConnected)],
            SignalingMessage::ConnectionError(reason) => self.on_transport_error(SessionError::Transport(reason)),
        }
    }

    fn on_transport_error(&mut self, err: SessionError) -> Vec<Action> {
        if self.state.is_negotiating() {
            return self.fail(err);
        }
        warn!(state = %self.state, "{err}");
        vec![Action::Emit(SessionEvent::Warning(err))]
    }

    fn on_malformed(&mut self, err: CodecError) -> Vec<Action> {
        // Only an unreadable answer interrupts a transition already under way.
        // A bad offer while Idle or Readying leaves the peer free to resend.
        let required = err.event() == events::ANSWER && self.state == SessionState::AwaitingAnswer;
        let err = SessionError::from(err);
        if required {
            return self.fail(err);
        }
        warn!(state = %self.state, "discarding malformed signaling message: {err}");
        vec![Action::Emit(SessionEvent::Warning(err))]
    }

    fn accepts_offer(&self) -> bool {
        matches!(self.state, SessionState::Idle | SessionState::Readying)
    }

    fn discard(&self, event: &str) -> Vec<Action> {
        warn!(event, state = %self.state, "discarding unexpected signaling message");
        vec![Action::Emit(SessionEvent::Warning(SessionError::protocol(format!(
            "unexpected `{event}` while {}",
            self.state
        ))))]
    }

    fn on_remote_ready(&mut self) -> Vec<Action> {
        if !matches!(self.state, SessionState::Idle | SessionState::Readying) {
            return self.discard(events::READY);
        }
        let mut out = Vec::new();
        self.assign_role(Role::Caller, &mut out);
        self.transition(SessionState::Offering, &mut out);
        self.awaiting = Some(NegotiationStep::CreateOffer);
        out.push(Action::Call(EngineCall::CreateOffer));
        out
    }

    fn on_offer(&mut self, desc: SessionDescription) -> Vec<Action> {
        if !self.accepts_offer() {
            return self.discard(events::OFFER);
        }
        let mut out = Vec::new();
        self.assign_role(Role::Callee, &mut out);
        self.transition(SessionState::Answering, &mut out);
        self.apply_remote(desc, &mut out);
        out
    }

    fn on_answer(&mut self, desc: SessionDescription) -> Vec<Action> {
        if self.state != SessionState::AwaitingAnswer {
            return self.discard(events::ANSWER);
        }
        let mut out = Vec::new();
        self.transition(SessionState::Answering, &mut out);
        self.apply_remote(desc, &mut out);
        out
    }

    fn on_remote_candidate(&mut self, cand: IceCandidate) -> Vec<Action> {
        if self.remote_description.is_some() {
            return vec![Action::Call(EngineCall::AddIceCandidate(cand))];
        }
        self.pending_remote.push(cand);
        debug!(pending = self.pending_remote.len(), "remote candidate buffered");
        Vec::new()
    }

    fn apply_remote(&mut self, desc: SessionDescription, out: &mut Vec<Action>) {
        self.staged_remote = Some(desc.clone());
        self.awaiting = Some(NegotiationStep::SetRemoteDescription);
        out.push(Action::Call(EngineCall::SetRemoteDescription(desc)));
    }

    fn stage_local(&mut self, step: NegotiationStep, desc: SessionDescription) -> Vec<Action> {
        let expected = match self.role {
            Role::Caller => SdpType::Offer,
            _ => SdpType::Answer,
        };
        if desc.sdp_type != expected {
            return self.fail(SessionError::Negotiation {
                step,
                reason: format!("engine produced {} where {expected} was expected", desc.sdp_type),
            });
        }
        self.staged_local = Some(desc.clone());
        self.awaiting = Some(NegotiationStep::SetLocalDescription);
        vec![Action::Call(EngineCall::SetLocalDescription(desc))]
    }

    fn local_committed(&mut self) -> Vec<Action> {
        let Some(desc) = self.staged_local.take() else {
            return self.fail(SessionError::Negotiation {
                step: NegotiationStep::SetLocalDescription,
                reason: "no local description was staged".to_string(),
            });
        };
        self.local_description = Some(desc.clone());
        let mut out = Vec::new();
        let next = match desc.sdp_type {
            SdpType::Offer => {
                out.push(Action::Send(SignalingMessage::Offer(desc)));
                SessionState::AwaitingAnswer
            }
            SdpType::Answer => {
                out.push(Action::Send(SignalingMessage::Answer(desc)));
                SessionState::Connected
            }
        };
        let flushed = self.pending_local.len();
        out.extend(
            self.pending_local
                .drain()
                .map(|c| Action::Send(SignalingMessage::IceCandidate(c))),
        );
        if flushed > 0 {
            debug!(flushed, "local candidates flushed");
        }
        self.transition(next, &mut out);
        out
    }

    fn remote_committed(&mut self) -> Vec<Action> {
        let Some(desc) = self.staged_remote.take() else {
            return self.fail(SessionError::Negotiation {
                step: NegotiationStep::SetRemoteDescription,
                reason: "no remote description was staged".to_string(),
            });
        };
        let sdp_type = desc.sdp_type;
        self.remote_description = Some(desc);
        let mut out: Vec<Action> = self
            .pending_remote
            .drain()
            .map(|c| Action::Call(EngineCall::AddIceCandidate(c)))
            .collect();
        if !out.is_empty() {
            debug!(applied = out.len(), "buffered remote candidates applied");
        }
        match sdp_type {
            SdpType::Offer => {
                self.awaiting = Some(NegotiationStep::CreateAnswer);
                out.push(Action::Call(EngineCall::CreateAnswer));
            }
            SdpType::Answer => self.transition(SessionState::Connected, &mut out),
        }
        out
    }

    fn assign_role(&mut self, role: Role, out: &mut Vec<Action>) {
        self.role = role;
        info!(session = %self.id, %role, "role assigned");
        out.push(Action::Emit(SessionEvent::RoleAssigned(role)));
    }

    fn transition(&mut self, to: SessionState, out: &mut Vec<Action>) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(session = %self.id, role = %self.role, %from, %to, "session state changed");
        out.push(Action::Emit(SessionEvent::StateChanged { from, to }));
    }

    fn fail(&mut self, err: SessionError) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        error!(session = %self.id, state = %self.state, kind = ?err.kind(), "session failed: {err}");
        self.dispose();
        let mut out = Vec::new();
        self.transition(SessionState::Failed, &mut out);
        out.push(Action::Emit(SessionEvent::Failed(err)));
        out.push(Action::Teardown);
        out
    }

    fn dispose(&mut self) {
        self.pending_local.clear();
        self.pending_remote.clear();
        self.staged_local = None;
        self.staged_remote = None;
        self.awaiting = None;
        self.local_description = None;
        self.remote_description = None;
    }
}
