/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::{events, IceCandidate, SdpType, SessionDescription, SignalingMessage};

/// A single event as it travels on the channel: a name plus an optional JSON argument.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    pub name: String,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("`{event}` requires a payload")]
    MissingPayload { event: String },
    #[error("invalid `{event}` payload: {reason}")]
    InvalidPayload { event: String, reason: String },
    #[error("`{event}` carries description type `{found}`")]
    TypeMismatch { event: String, found: String },
    #[error("unknown signaling event `{0}`")]
    UnknownEvent(String),
    #[error("`{0}` is produced by the connection itself and cannot be sent")]
    InboundOnly(&'static str),
}

impl CodecError {
    /// Name of the event the failure belongs to.
    pub fn event(&self) -> &str {
        match self {
            CodecError::MissingPayload { event }
            | CodecError::InvalidPayload { event, .. }
            | CodecError::TypeMismatch { event, .. } => event.as_str(),
            CodecError::UnknownEvent(name) => name.as_str(),
            CodecError::InboundOnly(name) => *name,
        }
    }
}

pub fn encode(msg: &SignalingMessage) -> Result<WireEvent, CodecError> {
    let payload = match msg {
        SignalingMessage::Ready => None,
        SignalingMessage::Offer(d) | SignalingMessage::Answer(d) => {
            Some(to_value(msg.event_name(), d)?)
        }
        SignalingMessage::IceCandidate(c) => Some(to_value(msg.event_name(), c)?),
        SignalingMessage::ConnectedAck | SignalingMessage::ConnectionError(_) => {
            return Err(CodecError::InboundOnly(msg.event_name()));
        }
    };
    Ok(WireEvent {
        name: msg.event_name().to_string(),
        payload,
    })
}

pub fn decode(name: &str, payload: Option<&Value>) -> Result<SignalingMessage, CodecError> {
    match name {
        events::READY => Ok(SignalingMessage::Ready),
        events::OFFER => decode_description(name, payload, SdpType::Offer).map(SignalingMessage::Offer),
        events::ANSWER => decode_description(name, payload, SdpType::Answer).map(SignalingMessage::Answer),
        events::ICE_CANDIDATE => {
            let cand: IceCandidate = from_payload(name, payload)?;
            Ok(SignalingMessage::IceCandidate(cand))
        }
        events::CONNECT => Ok(SignalingMessage::ConnectedAck),
        events::CONNECT_ERROR => Ok(SignalingMessage::ConnectionError(error_reason(payload))),
        other => Err(CodecError::UnknownEvent(other.to_string())),
    }
}

fn decode_description(
    name: &str,
    payload: Option<&Value>,
    expected: SdpType,
) -> Result<SessionDescription, CodecError> {
    // Check the raw tag first so a wrong-but-valid type reads as a mismatch
    // instead of a generic payload error.
    if let Some(found) = payload.and_then(|p| p.get("type")).and_then(Value::as_str) {
        if found != expected.as_str() && (found == "offer" || found == "answer") {
            return Err(CodecError::TypeMismatch {
                event: name.to_string(),
                found: found.to_string(),
            });
        }
    }
    from_payload(name, payload)
}

fn from_payload<T: DeserializeOwned>(name: &str, payload: Option<&Value>) -> Result<T, CodecError> {
    let value = match payload {
        Some(v) if !v.is_null() => v,
        _ => {
            return Err(CodecError::MissingPayload {
                event: name.to_string(),
            })
        }
    };
    T::deserialize(value).map_err(|e| CodecError::InvalidPayload {
        event: name.to_string(),
        reason: e.to_string(),
    })
}

fn to_value<T: serde::Serialize>(name: &str, v: &T) -> Result<Value, CodecError> {
    serde_json::to_value(v).map_err(|e| CodecError::InvalidPayload {
        event: name.to_string(),
        reason: e.to_string(),
    })
}

fn error_reason(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| v.to_string()),
        None => "connection refused".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offer_uses_canonical_wire_shape() {
        let msg = SignalingMessage::Offer(SessionDescription::offer("v=0\r\n"));
        let wire = encode(&msg).unwrap();
        assert_eq!(wire.name, "offer");
        assert_eq!(wire.payload, Some(json!({"type": "offer", "sdp": "v=0\r\n"})));
    }

    #[test]
    fn ready_has_no_payload() {
        let wire = encode(&SignalingMessage::Ready).unwrap();
        assert_eq!(wire.name, "ready");
        assert!(wire.payload.is_none());
        assert_eq!(decode("ready", None).unwrap(), SignalingMessage::Ready);
    }

    #[test]
    fn candidate_keys_match_wire_contract() {
        let cand = IceCandidate::new("0", 0, "candidate:1 1 UDP 2130706431 10.0.0.2 5000 typ host");
        let msg = SignalingMessage::IceCandidate(cand);
        let wire = encode(&msg).unwrap();
        let obj = wire.payload.unwrap();
        assert_eq!(obj["sdpMid"], "0");
        assert_eq!(obj["sdpMLineIndex"], 0);
        assert!(obj["candidate"].as_str().unwrap().starts_with("candidate:1"));
    }

    #[test]
    fn candidate_without_mid_is_rejected() {
        let payload = json!({"sdpMLineIndex": 0, "candidate": "candidate:1"});
        let err = decode("ice-candidate", Some(&payload)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidPayload { .. }));
        assert_eq!(err.event(), "ice-candidate");
    }

    #[test]
    fn negative_mline_index_is_rejected() {
        let payload = json!({"sdpMid": "0", "sdpMLineIndex": -1, "candidate": "candidate:1"});
        assert!(decode("ice-candidate", Some(&payload)).is_err());
    }

    #[test]
    fn description_type_is_case_sensitive() {
        let payload = json!({"type": "Offer", "sdp": "v=0"});
        assert!(matches!(
            decode("offer", Some(&payload)),
            Err(CodecError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn answer_payload_on_offer_event_is_a_mismatch() {
        let payload = json!({"type": "answer", "sdp": "v=0"});
        let err = decode("offer", Some(&payload)).unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch {
                event: "offer".into(),
                found: "answer".into()
            }
        );
    }

    #[test]
    fn missing_payload_is_reported() {
        assert_eq!(
            decode("answer", None).unwrap_err(),
            CodecError::MissingPayload { event: "answer".into() }
        );
    }

    #[test]
    fn connection_events_are_inbound_only() {
        assert_eq!(decode("connect", None).unwrap(), SignalingMessage::ConnectedAck);
        let msg = decode("connect_error", Some(&json!({"message": "forbidden"}))).unwrap();
        assert_eq!(msg, SignalingMessage::ConnectionError("forbidden".into()));
        assert!(matches!(
            encode(&SignalingMessage::ConnectedAck),
            Err(CodecError::InboundOnly("connect"))
        ));
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert_eq!(
            decode("bye", None).unwrap_err(),
            CodecError::UnknownEvent("bye".into())
        );
    }
}
