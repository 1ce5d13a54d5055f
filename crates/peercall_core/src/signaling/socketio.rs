/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Engine.IO v4 / Socket.IO v5 text framing, websocket transport only.

use anyhow::{bail, Context, Result};
use peercall_protocol::WireEvent;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PATH: &str = "/socket.io/";
pub const CONNECT_FRAME: &str = "40";
pub const DISCONNECT_FRAME: &str = "41";
pub const PONG_FRAME: &str = "3";

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open {
        sid: String,
        ping_interval: Duration,
        ping_timeout: Duration,
    },
    Close,
    Ping,
    Pong,
    Noop,
    Connect,
    Disconnect,
    ConnectError(String),
    Event { name: String, payload: Option<Value> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type `{0}`")]
    UnknownType(char),
    #[error("malformed {kind} packet: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPayload {
    sid: String,
    ping_interval: u64,
    ping_timeout: u64,
}

pub fn websocket_url(server_url: &str, path: &str) -> Result<String> {
    let uri: http::Uri = server_url
        .trim()
        .parse()
        .with_context(|| format!("invalid signaling url: {server_url}"))?;
    let scheme = match uri.scheme_str() {
        Some("http") | Some("ws") => "ws",
        Some("https") | Some("wss") => "wss",
        Some(other) => bail!("unsupported signaling url scheme `{other}`"),
        None => bail!("signaling url must include a scheme: {server_url}"),
    };
    let authority = uri
        .authority()
        .with_context(|| format!("signaling url must include a host: {server_url}"))?;
    let mut path = path.trim().to_string();
    if path.is_empty() {
        path = DEFAULT_PATH.to_string();
    }
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if !path.ends_with('/') {
        path.push('/');
    }
    Ok(format!("{scheme}://{authority}{path}?EIO=4&transport=websocket"))
}

pub fn encode_event(event: &WireEvent) -> String {
    let mut args = vec![Value::String(event.name.clone())];
    if let Some(payload) = &event.payload {
        args.push(payload.clone());
    }
    format!("42{}", Value::Array(args))
}

pub fn decode_frame(text: &str) -> Result<Frame, FrameError> {
    let kind = text.chars().next().ok_or(FrameError::Empty)?;
    let rest = &text[kind.len_utf8()..];
    match kind {
        '0' => decode_open(rest),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_packet(rest),
        '5' | '6' => Ok(Frame::Noop),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn decode_open(rest: &str) -> Result<Frame, FrameError> {
    let open: OpenPayload = serde_json::from_str(rest).map_err(|e| FrameError::Malformed {
        kind: "open",
        reason: e.to_string(),
    })?;
    Ok(Frame::Open {
        sid: open.sid,
        ping_interval: Duration::from_millis(open.ping_interval),
        ping_timeout: Duration::from_millis(open.ping_timeout),
    })
}

fn decode_packet(rest: &str) -> Result<Frame, FrameError> {
    let kind = rest.chars().next().ok_or_else(|| FrameError::Malformed {
        kind: "message",
        reason: "missing packet type".to_string(),
    })?;
    let mut body = &rest[kind.len_utf8()..];
    if body.starts_with('/') {
        let (nsp, tail) = body.split_once(',').unwrap_or((body, ""));
        if nsp != "/" {
            return Ok(Frame::Noop);
        }
        body = tail;
    }
    match kind {
        '0' => Ok(Frame::Connect),
        '1' => Ok(Frame::Disconnect),
        '2' => decode_event(body),
        '4' => Ok(Frame::ConnectError(connect_error_reason(body))),
        // acks and binary packets are never used by the call protocol
        '3' | '5' | '6' => Ok(Frame::Noop),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn decode_event(body: &str) -> Result<Frame, FrameError> {
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let args: Vec<Value> = serde_json::from_str(body).map_err(|e| FrameError::Malformed {
        kind: "event",
        reason: e.to_string(),
    })?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(FrameError::Malformed {
                kind: "event",
                reason: "event name must be a string".to_string(),
            })
        }
    };
    Ok(Frame::Event {
        name,
        payload: args.next(),
    })
}

fn connect_error_reason(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => s,
        Ok(v) => v
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| v.to_string()),
        Err(_) if body.is_empty() => "namespace connect refused".to_string(),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn derives_websocket_url_from_http_server() {
        assert_eq!(
            websocket_url("http://192.168.68.58:3000", DEFAULT_PATH).unwrap(),
            "ws://192.168.68.58:3000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("wss://signal.example.org", "rtc").unwrap(),
            "wss://signal.example.org/rtc/?EIO=4&transport=websocket"
        );
        assert!(websocket_url("192.168.68.58", DEFAULT_PATH).is_err());
    }

    #[test]
    fn encodes_events_as_json_arrays() {
        let ready = WireEvent {
            name: "ready".into(),
            payload: None,
        };
        assert_eq!(encode_event(&ready), r#"42["ready"]"#);
        let offer = WireEvent {
            name: "offer".into(),
            payload: Some(json!({"type": "offer", "sdp": "v=0"})),
        };
        let frame = encode_event(&offer);
        assert!(frame.starts_with(r#"42["offer",{"#));
        assert_eq!(
            decode_frame(&frame).unwrap(),
            Frame::Event {
                name: "offer".into(),
                payload: Some(json!({"type": "offer", "sdp": "v=0"}))
            }
        );
    }

    #[test]
    fn decodes_open_handshake() {
        let open = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let frame = decode_frame(open).unwrap();
        assert_eq!(
            frame,
            Frame::Open {
                sid: "abc".into(),
                ping_interval: Duration::from_secs(25),
                ping_timeout: Duration::from_secs(20),
            }
        );
    }

    #[test]
    fn decodes_control_packets() {
        assert_eq!(decode_frame("2").unwrap(), Frame::Ping);
        assert_eq!(decode_frame("6").unwrap(), Frame::Noop);
        assert_eq!(decode_frame(r#"40{"sid":"xyz"}"#).unwrap(), Frame::Connect);
        assert_eq!(decode_frame("41").unwrap(), Frame::Disconnect);
        assert_eq!(
            decode_frame(r#"44{"message":"not authorized"}"#).unwrap(),
            Frame::ConnectError("not authorized".into())
        );
    }

    #[test]
    fn skips_ack_ids_and_foreign_namespaces() {
        assert_eq!(
            decode_frame(r#"4212["ready"]"#).unwrap(),
            Frame::Event {
                name: "ready".into(),
                payload: None
            }
        );
        assert_eq!(decode_frame(r#"42/admin,["ready"]"#).unwrap(), Frame::Noop);
        assert_eq!(decode_frame(r#"42/,["ready"]"#).unwrap(), Frame::Event {
            name: "ready".into(),
            payload: None
        });
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(decode_frame("").unwrap_err(), FrameError::Empty);
        assert_eq!(decode_frame("x").unwrap_err(), FrameError::UnknownType('x'));
        assert!(matches!(
            decode_frame("42[1,2]"),
            Err(FrameError::Malformed { kind: "event", .. })
        ));
        assert!(matches!(
            decode_frame("42not json"),
            Err(FrameError::Malformed { .. })
        ));
    }
}
