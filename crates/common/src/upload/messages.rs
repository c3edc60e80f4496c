use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reason::ErrorCode;

/// One message as it arrived on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Bytes),
    /// The transport closed
    Close,
}

/// Text control messages. `data` is kept loose so each field can be
///  rejected with its own reason.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ControlMessage {
    Token {
        #[serde(default)]
        data: Value,
    },
    Option {
        #[serde(default)]
        data: Value,
    },
    Close,
}

impl ControlMessage {
    /// `None` for anything that is not a known control message
    pub(crate) fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Token,
    Option,
    Raw,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(rename = "type")]
    pub kind: ReplyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_bytes: Option<u64>,
}

impl Reply {
    pub fn ok(kind: ReplyKind) -> Self {
        Self {
            kind,
            reason: None,
            nid: None,
            uploaded_bytes: None,
        }
    }

    pub fn reject(kind: ReplyKind, reason: ErrorCode) -> Self {
        Self {
            reason: Some(reason),
            ..Self::ok(kind)
        }
    }

    pub fn shared(nid: String) -> Self {
        Self {
            nid: Some(nid),
            ..Self::ok(ReplyKind::Option)
        }
    }

    pub fn uploaded(bytes: u64) -> Self {
        Self {
            uploaded_bytes: Some(bytes),
            ..Self::ok(ReplyKind::Raw)
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.reason.is_some()
    }

    pub fn to_json(&self) -> String {
        // a struct of strings and integers always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// What the session loop hands back to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Reply(Reply),
    /// The session ended on its own and the transport should close
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_wire_shape() {
        assert_eq!(Reply::ok(ReplyKind::Token).to_json(), r#"{"type":"token"}"#);
        assert_eq!(
            Reply::reject(ReplyKind::Raw, ErrorCode::SendExceeded).to_json(),
            r#"{"type":"raw","reason":"SEND_EXCEEDED"}"#
        );
        assert_eq!(Reply::uploaded(12).to_json(), r#"{"type":"raw","uploadedBytes":12}"#);
        assert_eq!(
            Reply::shared("abc".into()).to_json(),
            r#"{"type":"option","nid":"abc"}"#
        );
    }

    #[test]
    fn test_control_parsing() {
        assert!(matches!(
            ControlMessage::parse(r#"{"type":"token","data":"x"}"#),
            Some(ControlMessage::Token { data: Value::String(_) })
        ));
        assert!(matches!(
            ControlMessage::parse(r#"{"type":"token"}"#),
            Some(ControlMessage::Token { data: Value::Null })
        ));
        assert!(matches!(
            ControlMessage::parse(r#"{"type":"close","extra":1}"#),
            Some(ControlMessage::Close)
        ));
        assert!(ControlMessage::parse(r#"{"type":"bogus"}"#).is_none());
        assert!(ControlMessage::parse("not json").is_none());
    }
}
