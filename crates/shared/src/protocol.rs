//! Push-channel protocol.
//!
//! Every frame is a JSON object `{ "type": <kind>, "payload": <object?> }`.
//! Frames are decoded in two steps: first into a [`RawFrame`] so that kinds
//! this crate does not understand can be forwarded untouched, then into a
//! typed [`ServerMessage`] when the kind is known.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::amount::MonetaryAmount;
use crate::currency::CurrencyCode;

pub const KIND_BALANCE_UPDATE: &str = "balance_update";
pub const KIND_CURRENCY_CHANGED: &str = "currency_changed";
pub const KIND_CONNECTED: &str = "connected";
pub const KIND_HEARTBEAT: &str = "heartbeat";
pub const KIND_PING: &str = "ping";
pub const KIND_PONG: &str = "pong";

/// Close code sent on an orderly shutdown of the push channel.
pub const CLOSE_NORMAL: u16 = 1000;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A frame before its payload has been interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl RawFrame {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone()).map_err(|source| ProtocolError::Payload {
            kind: self.kind.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdatePayload {
    pub balance: MonetaryAmount,
    pub currency: CurrencyCode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyChangedPayload {
    pub new_currency: CurrencyCode,
    pub new_balance: MonetaryAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_currency: Option<CurrencyCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_balance: Option<MonetaryAmount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Messages sent by the wallet backend over the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    BalanceUpdate(BalanceUpdatePayload),
    CurrencyChanged(CurrencyChangedPayload),
    Connected(ConnectedPayload),
    Heartbeat,
    Pong,
    /// Any kind the balance layer does not consume (chat, game updates, ...).
    Other(RawFrame),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Self::from_frame(RawFrame::parse(text)?)
    }

    pub fn from_frame(frame: RawFrame) -> Result<Self, ProtocolError> {
        let message = match frame.kind.as_str() {
            KIND_BALANCE_UPDATE => Self::BalanceUpdate(frame.decode()?),
            KIND_CURRENCY_CHANGED => Self::CurrencyChanged(frame.decode()?),
            KIND_CONNECTED => {
                if frame.payload.is_null() {
                    Self::Connected(ConnectedPayload::default())
                } else {
                    Self::Connected(frame.decode()?)
                }
            }
            KIND_HEARTBEAT => Self::Heartbeat,
            KIND_PONG => Self::Pong,
            _ => Self::Other(frame),
        };
        Ok(message)
    }

    pub fn to_frame(&self) -> RawFrame {
        match self {
            Self::BalanceUpdate(p) => RawFrame::new(KIND_BALANCE_UPDATE, to_value(p)),
            Self::CurrencyChanged(p) => RawFrame::new(KIND_CURRENCY_CHANGED, to_value(p)),
            Self::Connected(p) => RawFrame::new(KIND_CONNECTED, to_value(p)),
            Self::Heartbeat => RawFrame::new(KIND_HEARTBEAT, Value::Null),
            Self::Pong => RawFrame::new(KIND_PONG, Value::Null),
            Self::Other(frame) => frame.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        self.to_frame().to_json()
    }
}

/// Messages sent by the client over the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Ping(PingPayload),
}

impl ClientMessage {
    /// A liveness ping stamped with the current time.
    pub fn ping_now() -> Self {
        Self::Ping(PingPayload {
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Returns `None` for kinds a server does not need to act on.
    pub fn parse(text: &str) -> Result<Option<Self>, ProtocolError> {
        let frame = RawFrame::parse(text)?;
        match frame.kind.as_str() {
            KIND_PING => {
                // A bare ping is accepted.
                if frame.payload.is_null() {
                    Ok(Some(Self::Ping(PingPayload { timestamp: 0 })))
                } else {
                    Ok(Some(Self::Ping(frame.decode()?)))
                }
            }
            _ => Ok(None),
        }
    }

    pub fn to_json(&self) -> String {
        match self {
            Self::Ping(p) => RawFrame::new(KIND_PING, to_value(p)).to_json(),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_balance_update() {
        let msg = ServerMessage::parse(
            r#"{"type":"balance_update","payload":{"balance":"150.00","currency":"USD"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::BalanceUpdate(BalanceUpdatePayload {
                balance: "150.00".into(),
                currency: CurrencyCode::USD,
            })
        );
    }

    #[test]
    fn decodes_currency_changed_with_and_without_previous_values() {
        let full = ServerMessage::parse(
            r#"{"type":"currency_changed","payload":{"newCurrency":"BDT","newBalance":"11000.00","oldCurrency":"USD","oldBalance":"100.00"}}"#,
        )
        .unwrap();
        let ServerMessage::CurrencyChanged(payload) = full else {
            panic!("expected currency_changed");
        };
        assert_eq!(payload.old_currency, Some(CurrencyCode::USD));

        let bare = ServerMessage::parse(
            r#"{"type":"currency_changed","payload":{"newCurrency":"BTC","newBalance":"0.5"}}"#,
        )
        .unwrap();
        assert!(matches!(bare, ServerMessage::CurrencyChanged(p) if p.old_balance.is_none()));
    }

    #[test]
    fn heartbeat_needs_no_payload() {
        assert_eq!(
            ServerMessage::parse(r#"{"type":"heartbeat"}"#).unwrap(),
            ServerMessage::Heartbeat
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type":"heartbeat","payload":{"timestamp":1}}"#).unwrap(),
            ServerMessage::Heartbeat
        );
    }

    #[test]
    fn unknown_kinds_are_kept_verbatim() {
        let text = r#"{"type":"chat_message","payload":{"text":"hi"}}"#;
        let ServerMessage::Other(frame) = ServerMessage::parse(text).unwrap() else {
            panic!("expected passthrough");
        };
        assert_eq!(frame.kind, "chat_message");
        assert_eq!(frame.payload, json!({"text": "hi"}));
    }

    #[test]
    fn bad_payload_for_known_kind_is_an_error() {
        let err = ServerMessage::parse(r#"{"type":"balance_update","payload":{"balance":1}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Payload { ref kind, .. } if kind == "balance_update"));
        assert!(ServerMessage::parse("not json").is_err());
    }

    #[test]
    fn ping_wire_shape() {
        let ping = ClientMessage::Ping(PingPayload { timestamp: 42 });
        let value: Value = serde_json::from_str(&ping.to_json()).unwrap();
        assert_eq!(value, json!({"type": "ping", "payload": {"timestamp": 42}}));
        assert_eq!(ClientMessage::parse(&ping.to_json()).unwrap(), Some(ping));
    }

    #[test]
    fn heartbeat_serializes_without_payload() {
        assert_eq!(ServerMessage::Heartbeat.to_json(), r#"{"type":"heartbeat"}"#);
    }
}
