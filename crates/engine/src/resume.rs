//! Resume token codec.
//!
//! Token format: URL-safe base64 (no padding) of the JSON-serialized [`ResumePayload`].
//! The token is an opaque convenience for hosts, not a security boundary: nothing is
//! signed or encrypted, and anyone holding a token can read it.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use stepwise_types::{RESUME_PROTOCOL_VERSION, ResumePayload};

use crate::error::DecodeError;

/// Serializes a payload into an opaque token.
pub fn encode_resume_token(payload: &ResumePayload) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Parses a token produced by [`encode_resume_token`].
///
/// Surrounding whitespace is ignored. Invalid base64, a payload that does not match the
/// expected shape (including an unknown `kind`), and a foreign protocol version are all
/// rejected.
pub fn decode_resume_token(token: &str) -> Result<ResumePayload, DecodeError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = URL_SAFE_NO_PAD.decode(trimmed)?;
    let payload: ResumePayload = serde_json::from_slice(&bytes).map_err(DecodeError::Payload)?;

    if payload.protocol_version != RESUME_PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: payload.protocol_version,
            expected: RESUME_PROTOCOL_VERSION,
        });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use stepwise_types::{ResumeKind, StepResult, WorkflowSource};

    fn sample_payload() -> ResumePayload {
        let mut args = serde_json::Map::new();
        args.insert("topic".into(), json!("rust"));
        args.insert("limits".into(), json!({"max": 3, "tags": ["a", "b"]}));

        ResumePayload {
            protocol_version: RESUME_PROTOCOL_VERSION,
            kind: ResumeKind::WorkflowFile,
            workflow: WorkflowSource {
                name: "summarize".into(),
                file: Some(PathBuf::from("/srv/flows/summarize.yaml")),
            },
            args,
            next_step_index: 2,
            results: vec![
                StepResult::from_process("fetch", "{\"items\": [1, 2]}\n".into(), "warn: slow\n".into(), 0),
                StepResult::from_completion("draft", "Line one\nLine \"two\" ünïcode ✓"),
            ],
        }
    }

    #[test]
    fn decode_inverts_encode() {
        let payload = sample_payload();
        let token = encode_resume_token(&payload).expect("encode");
        let decoded = decode_resume_token(&token).expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn decode_inverts_encode_for_minimal_payload() {
        let payload = ResumePayload {
            protocol_version: RESUME_PROTOCOL_VERSION,
            kind: ResumeKind::WorkflowFile,
            workflow: WorkflowSource {
                name: "inline".into(),
                file: None,
            },
            args: serde_json::Map::new(),
            next_step_index: 0,
            results: Vec::new(),
        };
        let token = encode_resume_token(&payload).expect("encode");
        assert_eq!(decode_resume_token(&token).expect("decode"), payload);
    }

    #[test]
    fn decode_inverts_encode_for_explicit_null_json() {
        let mut payload = sample_payload();
        payload.results[1].json = Some(serde_json::Value::Null);
        let token = encode_resume_token(&payload).expect("encode");
        assert_eq!(decode_resume_token(&token).expect("decode"), payload);
    }

    #[test]
    fn token_is_url_safe_and_whitespace_tolerant() {
        let token = encode_resume_token(&sample_payload()).expect("encode");
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(decode_resume_token(&format!("  {token}\n")).is_ok());
    }

    #[test]
    fn rejects_empty_and_non_base64_tokens() {
        assert!(matches!(decode_resume_token("   "), Err(DecodeError::Empty)));
        assert!(matches!(decode_resume_token("not base64!"), Err(DecodeError::Encoding(_))));
    }

    #[test]
    fn rejects_tampered_payloads() {
        let garbage = URL_SAFE_NO_PAD.encode(b"{\"protocolVersion\": 1");
        assert!(matches!(decode_resume_token(&garbage), Err(DecodeError::Payload(_))));

        let unknown_kind = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({
                "protocolVersion": 1,
                "kind": "something_else",
                "workflow": {"name": "x"},
                "nextStepIndex": 0
            }))
            .expect("serialize"),
        );
        assert!(matches!(decode_resume_token(&unknown_kind), Err(DecodeError::Payload(_))));
    }

    #[test]
    fn rejects_foreign_protocol_versions() {
        let mut payload = sample_payload();
        payload.protocol_version = 99;
        let token = encode_resume_token(&payload).expect("encode");
        assert!(matches!(
            decode_resume_token(&token),
            Err(DecodeError::UnsupportedVersion { found: 99, expected: 1 })
        ));
    }
}
