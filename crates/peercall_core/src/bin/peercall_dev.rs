/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use peercall_core::config::{self, CallConfig};
use peercall_core::engine::TracingSink;
use peercall_core::webrtc_engine::WebrtcEngine;
use peercall_core::CallController;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

fn load_config() -> Result<CallConfig> {
    let path = config::config_path()?;
    if path.exists() {
        info!("config: {}", path.display());
        return config::load_config_file(&path);
    }
    warn!("config missing: {} (using defaults)", path.display());
    Ok(config::config_from_env())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .try_init()
        .ok();

    info!("peercall dev client {}", peercall_core::version());
    let cfg = load_config()?;
    let engine = WebrtcEngine::new(&cfg.engine())
        .await
        .context("create webrtc engine")?;
    let controller = CallController::new(&cfg, Arc::new(engine), Arc::new(TracingSink))?;

    let mut events = controller.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => info!(?ev, "session event"),
                Err(RecvError::Lagged(n)) => warn!("missed {n} session events"),
                Err(RecvError::Closed) => break,
            }
        }
    });
    controller.connect()?;
    info!("commands: call | hangup | status");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let closed = controller.closed();
    tokio::pin!(closed);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown requested");
                break;
            }
            _ = &mut closed => {
                info!("session ended");
                return Ok(());
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin: {e}");
                        break;
                    }
                };
                match line.trim() {
                    "call" => {
                        if let Err(e) = controller.start_call().await {
                            warn!("cannot start call: {e}");
                        }
                    }
                    "hangup" => break,
                    "status" => {
                        let snap = controller.snapshot();
                        let metrics = controller.metrics();
                        info!(
                            state = %snap.state,
                            role = %snap.role,
                            connected = metrics.connected,
                            reconnects = metrics.reconnects,
                            "status"
                        );
                    }
                    "" => {}
                    other => warn!("unknown command `{other}`"),
                }
            }
        }
    }

    controller.hang_up().await;
    Ok(())
}
