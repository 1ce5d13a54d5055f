/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{execute, EngineCall, EngineEvent, FrameSink, NegotiationEngine};
use crate::error::SessionError;
use crate::session::{Action, Session, SessionEvent, SessionId, SessionSnapshot, StepOutcome};
use crate::signaling::{ChannelEvent, Signaling};

const EVENT_CAPACITY: usize = 64;

enum Command {
    SignalReady(oneshot::Sender<Result<(), SessionError>>),
    HangUp,
}

/// Cloneable handle to a running session. The session hangs up once every handle is dropped.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    stopped: watch::Receiver<bool>,
}

impl OrchestratorHandle {
    pub async fn signal_ready(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::SignalReady(tx)).is_err() {
            return Err(self.terminated("signal_ready"));
        }
        rx.await.unwrap_or_else(|_| Err(self.terminated("signal_ready")))
    }

    pub fn hang_up(&self) {
        if self.commands.send(Command::HangUp).is_err() {
            debug!("hang up after session end");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Resolves once teardown has finished.
    pub async fn closed(&self) {
        let mut stopped = self.stopped.clone();
        let _ = stopped.wait_for(|v| *v).await;
    }

    fn terminated(&self, operation: &'static str) -> SessionError {
        SessionError::State {
            operation,
            state: self.snapshot.borrow().state,
        }
    }
}

/// Starts the session task and its engine worker.
pub fn spawn(
    engine: Arc<dyn NegotiationEngine>,
    signaling: Arc<dyn Signaling>,
    sink: Arc<dyn FrameSink>,
    channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
) -> OrchestratorHandle {
    let session = Session::new();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let (stopped_tx, stopped_rx) = watch::channel(false);

    let (engine_events_tx, engine_events_rx) = mpsc::unbounded_channel();
    engine.attach(engine_events_tx);

    let (calls_tx, calls_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(run_engine_worker(engine.clone(), calls_rx, done_tx));

    info!(session = %session.id(), "session started");
    let driver = Driver {
        session,
        engine,
        signaling,
        sink,
        calls: calls_tx,
        worker,
        snapshot: snapshot_tx,
        events: events_tx.clone(),
    };
    tokio::spawn(async move {
        driver.run(commands_rx, channel_events, engine_events_rx, done_rx).await;
        stopped_tx.send_replace(true);
    });

    OrchestratorHandle {
        commands: commands_tx,
        snapshot: snapshot_rx,
        events: events_tx,
        stopped: stopped_rx,
    }
}

/// Executes engine calls one at a time, in the order the session issued them.
async fn run_engine_worker(
    engine: Arc<dyn NegotiationEngine>,
    mut calls: mpsc::UnboundedReceiver<(SessionId, EngineCall)>,
    done: mpsc::UnboundedSender<StepOutcome>,
) {
    while let Some((session, call)) = calls.recv().await {
        let step = call.step();
        debug!(%session, %step, "engine call");
        let result = execute(engine.as_ref(), call).await;
        if let Err(e) = &result {
            warn!(%session, %step, "engine rejected step: {e}");
        }
        if done.send(StepOutcome { session, step, result }).is_err() {
            break;
        }
    }
}

struct Driver {
    session: Session,
    engine: Arc<dyn NegotiationEngine>,
    signaling: Arc<dyn Signaling>,
    sink: Arc<dyn FrameSink>,
    calls: mpsc::UnboundedSender<(SessionId, EngineCall)>,
    worker: JoinHandle<()>,
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
        mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        mut completions: mpsc::UnboundedReceiver<StepOutcome>,
    ) {
        let mut channel_events = Some(channel_events);
        loop {
            let actions = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::SignalReady(reply)) => match self.session.signal_ready() {
                        Ok(actions) => {
                            let _ = reply.send(Ok(()));
                            actions
                        }
                        Err(e) => {
                            warn!("{e}");
                            let _ = reply.send(Err(e));
                            continue;
                        }
                    },
                    Some(Command::HangUp) => self.session.hang_up(),
                    None => {
                        info!("all session handles dropped");
                        self.session.hang_up()
                    }
                },
                Some(outcome) = completions.recv() => self.session.on_step_done(outcome),
                ev = recv_opt(&mut channel_events), if channel_events.is_some() => match ev {
                    Some(ev) => self.session.on_channel_event(ev),
                    None => {
                        channel_events = None;
                        self.session.on_channel_event(ChannelEvent::Disconnected)
                    }
                },
                Some(ev) = engine_events.recv() => self.session.on_engine_event(ev),
            };
            let stop = self.apply(actions);
            self.publish();
            if stop || self.session.state().is_terminal() {
                break;
            }
        }
        // No further signaling input is read from here on.
        drop(channel_events);
        self.teardown().await;
    }

    /// Performs actions in order. Returns true once teardown was requested.
    fn apply(&mut self, actions: Vec<Action>) -> bool {
        let mut queue: VecDeque<Action> = actions.into();
        let mut stop = false;
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Send(msg) => {
                    debug!(%msg, "sending signaling message");
                    if let Err(e) = self.signaling.send(msg) {
                        // the rest of the batch belonged to a session that just failed
                        queue.clear();
                        queue.extend(self.session.on_channel_event(ChannelEvent::SendFailed(e.to_string())));
                    }
                }
                Action::Call(call) => {
                    if self.calls.send((self.session.id(), call)).is_err() {
                        error!("engine worker is gone");
                    }
                }
                Action::Render(media) => self.sink.render(&media),
                Action::Emit(event) => {
                    let _ = self.events.send(event);
                }
                Action::Teardown => stop = true,
            }
        }
        stop
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.session.snapshot());
    }

    async fn teardown(self) {
        let Driver {
            session,
            engine,
            signaling,
            sink,
            calls,
            worker,
            ..
        } = self;
        // Calls still queued behind the current one must not reach a closing engine.
        drop(calls);
        worker.abort();
        if let Err(e) = worker.await {
            if !e.is_cancelled() {
                warn!("engine worker failed: {e}");
            }
        }
        engine.close().await;
        sink.release();
        signaling.disconnect().await;
        info!(session = %session.id(), state = %session.state(), "session disposed");
    }
}

async fn recv_opt<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
