/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use peercall_protocol::SignalingMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::socketio::{self, Frame};
use super::{ChannelEvent, Signaling};
use crate::config::SignalingConfig;
use crate::error::SessionError;
use crate::metrics::SignalingMetrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Used until the server's open packet says otherwise.
const DEFAULT_LIVENESS: Duration = Duration::from_secs(45);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Socket.IO client for the rendezvous server. One connection task per channel,
/// reconnecting with backoff until disconnected.
pub struct SignalingChannel {
    cfg: SignalingConfig,
    metrics: Arc<SignalingMetrics>,
    events: EventSink,
    subscribed: AtomicBool,
    closed: AtomicBool,
    running: Mutex<Option<Running>>,
}

struct Running {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

#[derive(Clone, Default)]
struct EventSink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<ChannelEvent>>>>,
}

impl EventSink {
    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<ChannelEvent>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChannelEvent) {
        match self.lock().as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("signaling subscriber dropped");
                }
            }
            None => debug!(?event, "no signaling subscriber, event dropped"),
        }
    }

    fn set(&self, tx: mpsc::UnboundedSender<ChannelEvent>) {
        *self.lock() = Some(tx);
    }

    fn close(&self) {
        self.lock().take();
    }
}

enum Exit {
    Shutdown,
    Dropped(String),
}

impl SignalingChannel {
    pub fn new(cfg: SignalingConfig, metrics: Arc<SignalingMetrics>) -> Self {
        Self {
            cfg,
            metrics,
            events: EventSink::default(),
            subscribed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the single consumer of channel events. `None` if one is already registered.
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<ChannelEvent>> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.events.set(tx);
        Some(rx)
    }

    pub fn is_connected(&self) -> bool {
        self.metrics.is_connected()
    }

    /// Starts the connection task. Calling it again while the task runs is a no-op.
    pub fn connect(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::transport("signaling channel was disconnected"));
        }
        let mut running = self.running();
        if running.as_ref().is_some_and(|r| !r.join.is_finished()) {
            debug!("signaling channel already connecting");
            return Ok(());
        }
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::transport(format!("no async runtime: {e}")))?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = rt.spawn(run_connection(
            self.cfg.clone(),
            self.events.clone(),
            outbound_rx,
            shutdown_rx,
            self.metrics.clone(),
        ));
        *running = Some(Running {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            join,
        });
        Ok(())
    }
}

#[async_trait]
impl Signaling for SignalingChannel {
    fn send(&self, msg: SignalingMessage) -> Result<(), SessionError> {
        let wire = peercall_protocol::encode(&msg)?;
        let frame = socketio::encode_event(&wire);
        if !self.metrics.is_connected() {
            return Err(SessionError::transport("signaling channel is not connected"));
        }
        let running = self.running();
        let Some(r) = running.as_ref() else {
            return Err(SessionError::transport("signaling channel is not connected"));
        };
        r.outbound
            .send(frame)
            .map_err(|_| SessionError::transport("signaling connection task has stopped"))?;
        debug!(event = msg.event_name(), "signaling message queued");
        Ok(())
    }

    async fn disconnect(&self) {
        self.events.close();
        self.closed.store(true, Ordering::SeqCst);
        let running = self.running().take();
        let Some(r) = running else {
            return;
        };
        let _ = r.shutdown.send(true);
        drop(r.outbound);
        let mut join = r.join;
        if tokio::time::timeout(DISCONNECT_GRACE, &mut join).await.is_err() {
            warn!("signaling task did not stop in time, aborting");
            join.abort();
        }
        info!("signaling channel disconnected");
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(r) = self.running().take() {
            let _ = r.shutdown.send(true);
        }
    }
}

async fn run_connection(
    cfg: SignalingConfig,
    events: EventSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
    metrics: Arc<SignalingMetrics>,
) {
    let mut backoff = Backoff::new(cfg.reconnect_delay, cfg.reconnect_delay_max);
    let mut failures: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }
        info!(url = %cfg.url, "connecting signaling channel");
        match open_session(&cfg).await {
            Ok((ws, liveness)) => {
                failures = 0;
                backoff.reset();
                metrics.set_connected(true);
                info!("signaling channel connected");
                events.emit(ChannelEvent::Message(SignalingMessage::ConnectedAck));
                let exit = pump(ws, liveness, &events, &mut outbound, &mut shutdown, &metrics).await;
                metrics.set_connected(false);
                match exit {
                    Exit::Shutdown => break,
                    Exit::Dropped(reason) => {
                        warn!(%reason, "signaling connection dropped");
                        metrics.set_error(reason);
                        events.emit(ChannelEvent::Disconnected);
                        discard_outbound(&mut outbound, &events);
                    }
                }
            }
            Err(e) => {
                warn!("signaling connect failed: {e:#}");
                metrics.set_error(format!("{e:#}"));
                events.emit(ChannelEvent::Message(SignalingMessage::ConnectionError(format!("{e:#}"))));
                discard_outbound(&mut outbound, &events);
                failures += 1;
            }
        }

        if !cfg.reconnect {
            info!("reconnection disabled, signaling task exiting");
            break;
        }
        if cfg.reconnect_attempts.is_some_and(|max| failures >= max) {
            warn!(failures, "giving up on signaling server");
            break;
        }
        let delay = backoff.next_delay();
        metrics.reconnect_attempt();
        debug!(?delay, "reconnecting signaling channel");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            res = shutdown.changed() => {
                if res.is_err() {
                    break;
                }
            }
        }
    }
    metrics.set_connected(false);
}

/// Frames queued for a connection that is gone are never replayed on the next one.
fn discard_outbound(outbound: &mut mpsc::UnboundedReceiver<String>, events: &EventSink) {
    let mut dropped = 0usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "discarding signaling frames queued for a lost connection");
        events.emit(ChannelEvent::SendFailed(format!(
            "{dropped} queued signaling message(s) lost with the connection"
        )));
    }
}

/// WebSocket connect plus Engine.IO open and namespace connect, bounded by `connect_timeout`.
async fn open_session(cfg: &SignalingConfig) -> anyhow::Result<(WsStream, Duration)> {
    let (mut ws, _) = tokio::time::timeout(cfg.connect_timeout, tokio_tungstenite::connect_async(cfg.url.as_str()))
        .await
        .context("websocket connect timed out")?
        .context("websocket connect")?;
    let liveness = tokio::time::timeout(cfg.connect_timeout, handshake(&mut ws))
        .await
        .context("socket.io handshake timed out")??;
    Ok((ws, liveness))
}

async fn handshake(ws: &mut WsStream) -> anyhow::Result<Duration> {
    let mut liveness = DEFAULT_LIVENESS;
    loop {
        let text = match ws.next().await {
            None => bail!("connection closed during handshake"),
            Some(msg) => match msg? {
                tungstenite::Message::Text(t) => t,
                tungstenite::Message::Close(_) => bail!("server closed during handshake"),
                _ => continue,
            },
        };
        match socketio::decode_frame(&text)? {
            Frame::Open {
                sid,
                ping_interval,
                ping_timeout,
            } => {
                debug!(%sid, ?ping_interval, ?ping_timeout, "engine.io session opened");
                liveness = ping_interval + ping_timeout;
                ws.send(tungstenite::Message::Text(socketio::CONNECT_FRAME.to_string())).await?;
            }
            Frame::Connect => return Ok(liveness),
            Frame::ConnectError(reason) => bail!("namespace connect refused: {reason}"),
            Frame::Ping => {
                ws.send(tungstenite::Message::Text(socketio::PONG_FRAME.to_string())).await?;
            }
            Frame::Close | Frame::Disconnect => bail!("server closed during handshake"),
            _ => {}
        }
    }
}

async fn pump(
    ws: WsStream,
    liveness: Duration,
    events: &EventSink,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
    metrics: &SignalingMetrics,
) -> Exit {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let idle = tokio::time::sleep(liveness);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            biased;
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    let _ = ws_tx.send(tungstenite::Message::Text(socketio::DISCONNECT_FRAME.to_string())).await;
                    let _ = ws_tx.close().await;
                    return Exit::Shutdown;
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.close().await;
                    return Exit::Shutdown;
                };
                let len = frame.len() as u64;
                if let Err(e) = ws_tx.send(tungstenite::Message::Text(frame)).await {
                    events.emit(ChannelEvent::SendFailed(e.to_string()));
                    return Exit::Dropped(format!("send failed: {e}"));
                }
                metrics.tx_add(len);
            }
            _ = &mut idle => return Exit::Dropped("no ping from server".to_string()),
            msg = ws_rx.next() => {
                let msg = match msg {
                    None => return Exit::Dropped("connection closed".to_string()),
                    Some(Err(e)) => return Exit::Dropped(e.to_string()),
                    Some(Ok(m)) => m,
                };
                let text = match msg {
                    tungstenite::Message::Text(t) => t,
                    tungstenite::Message::Ping(p) => {
                        let _ = ws_tx.send(tungstenite::Message::Pong(p)).await;
                        continue;
                    }
                    tungstenite::Message::Close(_) => return Exit::Dropped("closed by server".to_string()),
                    _ => continue,
                };
                idle.as_mut().reset(tokio::time::Instant::now() + liveness);
                metrics.rx_add(text.len() as u64);
                match socketio::decode_frame(&text) {
                    Ok(Frame::Ping) => {
                        if let Err(e) = ws_tx.send(tungstenite::Message::Text(socketio::PONG_FRAME.to_string())).await {
                            return Exit::Dropped(format!("pong failed: {e}"));
                        }
                    }
                    Ok(Frame::Event { name, payload }) => {
                        metrics.message_received();
                        match peercall_protocol::decode(&name, payload.as_ref()) {
                            Ok(msg) => {
                                debug!(event = %name, "signaling message received");
                                events.emit(ChannelEvent::Message(msg));
                            }
                            Err(e) => {
                                warn!(event = %name, "malformed signaling message: {e}");
                                events.emit(ChannelEvent::Malformed(e));
                            }
                        }
                    }
                    Ok(Frame::ConnectError(reason)) => {
                        events.emit(ChannelEvent::Message(SignalingMessage::ConnectionError(reason)));
                    }
                    Ok(Frame::Disconnect) | Ok(Frame::Close) => {
                        return Exit::Dropped("server ended the session".to_string());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("bad socket.io frame: {e}"),
                }
            }
        }
    }
}
