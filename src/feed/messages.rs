//! Wire messages exchanged with the signal server

use serde::{Deserialize, Serialize};

/// Body of `POST /auth`
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest<'a> {
    pub client_id: &'a str,
    pub password: &'a str,
}

/// Successful `POST /auth` response
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
}

/// First client frame on the streaming connection
#[derive(Debug, Clone, Serialize)]
pub struct TokenFrame<'a> {
    pub token: &'a str,
}

/// Optional server reply to the token frame
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeReply {
    #[serde(default)]
    pub error: Option<String>,
}

/// How the handshake reply is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeVerdict {
    Accepted,
    TokenRejected(String),
    Failed(String),
}

const TOKEN_REJECTIONS: &[&str] = &["token_expired", "invalid_token", "unauthorized"];

impl HandshakeReply {
    /// Interpret a raw reply. Anything that is not an error object counts as acceptance.
    pub fn verdict(text: &str) -> HandshakeVerdict {
        let reply: HandshakeReply = match serde_json::from_str(text) {
            Ok(reply) => reply,
            Err(_) => return HandshakeVerdict::Accepted,
        };

        match reply.error {
            Some(error) if TOKEN_REJECTIONS.contains(&error.as_str()) => {
                HandshakeVerdict::TokenRejected(error)
            }
            Some(error) => HandshakeVerdict::Failed(error),
            None => HandshakeVerdict::Accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_frame_shape() {
        let frame = serde_json::to_string(&TokenFrame { token: "tok-1" }).unwrap();
        assert_eq!(frame, r#"{"token":"tok-1"}"#);
    }

    #[test]
    fn test_auth_request_shape() {
        let body = serde_json::to_value(AuthRequest {
            client_id: "c1",
            password: "p1",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"client_id": "c1", "password": "p1"}));
    }

    #[test]
    fn test_handshake_verdicts() {
        assert_eq!(
            HandshakeReply::verdict(r#"{"error":"token_expired"}"#),
            HandshakeVerdict::TokenRejected("token_expired".to_string())
        );
        assert_eq!(
            HandshakeReply::verdict(r#"{"error":"overloaded"}"#),
            HandshakeVerdict::Failed("overloaded".to_string())
        );
        assert_eq!(
            HandshakeReply::verdict(r#"{"status":"authenticated"}"#),
            HandshakeVerdict::Accepted
        );
        assert_eq!(HandshakeReply::verdict("welcome"), HandshakeVerdict::Accepted);
    }
}
