//! The wire `Request` model (§3). Encoded as JSON — a self-describing,
//! nested-document format — with binary `content` carried as base64, the
//! same trick the teacher uses to move binary payloads over an SSH-executed
//! shell command in `deploy.rs`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileAction {
    Update,
    Move,
    Create,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileKind {
    File,
    Dir,
}

mod content_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        opt.map(|s| {
            base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

/// A `FILE` request (§3). `dest` is present iff `action == Move`; `content`/
/// `digest` are present for `Create`/`Update` of `File` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRequest {
    pub action: FileAction,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "content_b64"
    )]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl FileRequest {
    /// Fingerprint used by loop suppression (§3, §9): `(action, src, len(content))`.
    #[must_use]
    pub fn fingerprint(&self) -> (FileAction, String, usize) {
        (
            self.action,
            self.src.clone(),
            self.content.as_ref().map_or(0, Vec::len),
        )
    }

    /// Builds a `CREATE`/`UPDATE` request for a file, computing the digest.
    #[must_use]
    pub fn with_content(action: FileAction, src: String, content: Vec<u8>) -> Self {
        let digest = crate::digest::hex_digest(&content);
        Self {
            action,
            kind: FileKind::File,
            src,
            dest: None,
            content: Some(content),
            digest: Some(digest),
        }
    }
}

/// A structured log record (§4.5 `INTERNAL` mode), equivalent to Python's
/// `(name, level, file, line, message, function)` tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecordPayload {
    pub name: String,
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// A `LOG` request (§3): exactly one of `log_record`/`log_message` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_record: Option<LogRecordPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

impl LogRequest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let record_empty = self
            .log_record
            .as_ref()
            .is_none_or(|r| r.message.trim().is_empty());
        let message_empty = self
            .log_message
            .as_ref()
            .is_none_or(|m| m.trim().is_empty());
        record_empty && message_empty
    }
}

/// The tagged `Request` record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Request {
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "GOODBYE")]
    Goodbye,
    #[serde(rename = "FILE")]
    File(FileRequest),
    #[serde(rename = "LOG")]
    Log(LogRequest),
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "PONG")]
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_request_roundtrips_through_json() {
        let req = Request::File(FileRequest::with_content(
            FileAction::Create,
            "src/a.txt".to_string(),
            b"hi".to_vec(),
        ));
        let encoded = serde_json::to_vec(&req).unwrap();
        let decoded: Request = serde_json::from_slice(&encoded).unwrap();
        match decoded {
            Request::File(f) => {
                assert_eq!(f.src, "src/a.txt");
                assert_eq!(f.content.as_deref(), Some(b"hi".as_slice()));
                assert_eq!(f.digest.as_deref(), Some("49f68a5c8493ec2c0bf489821c21fc3b"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unit_variants_roundtrip() {
        for req in [Request::Unknown, Request::Goodbye, Request::Ping, Request::Pong] {
            let encoded = serde_json::to_vec(&req).unwrap();
            let _: Request = serde_json::from_slice(&encoded).unwrap();
        }
    }

    #[test]
    fn log_request_is_empty_when_both_payloads_blank() {
        let empty = LogRequest::default();
        assert!(empty.is_empty());
        let with_message = LogRequest {
            log_message: Some("started".to_string()),
            ..Default::default()
        };
        assert!(!with_message.is_empty());
    }
}
