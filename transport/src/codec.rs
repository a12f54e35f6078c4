//! The `::LENGTH=<N>::`-framed codec (§4.1). Implements the same
//! `tokio_util::codec::{Encoder, Decoder}` traits the teacher uses for its
//! own (differently-framed) `LengthDelimitedCodec` wrapping in
//! `streams.rs`, so it plugs into `FramedRead`/`FramedWrite` the same way.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::Request;

const MARKER_PREFIX: &[u8] = b"::LENGTH=";
const MARKER_SUFFIX: &[u8] = b"::";

/// Length-prefixed JSON-document framing for [`Request`].
#[derive(Debug, Default)]
pub struct FrameCodec;

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl Encoder<Request> for FrameCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let doc = serde_json::to_vec(&item)?;
        dst.extend_from_slice(MARKER_PREFIX);
        dst.extend_from_slice(doc.len().to_string().as_bytes());
        dst.extend_from_slice(MARKER_SUFFIX);
        dst.extend_from_slice(&doc);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Request;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }
            let prefix_pos = match find_subslice(src, MARKER_PREFIX) {
                Some(pos) => pos,
                None => return Ok(None),
            };
            if prefix_pos > 0 {
                tracing::warn!(
                    discarded = prefix_pos,
                    "malformed marker, resynchronizing frame stream"
                );
                src.advance(prefix_pos);
                continue;
            }

            let after_prefix = MARKER_PREFIX.len();
            let suffix_rel = match find_subslice(&src[after_prefix..], MARKER_SUFFIX) {
                Some(pos) => pos,
                None => return Ok(None), // length digits not fully arrived yet
            };
            let digits = &src[after_prefix..after_prefix + suffix_rel];
            let len_str = match std::str::from_utf8(digits) {
                Ok(s) => s,
                Err(_) => {
                    tracing::warn!("non-UTF8 length marker, resynchronizing");
                    src.advance(after_prefix);
                    continue;
                }
            };
            let n: usize = match len_str.parse() {
                Ok(n) => n,
                Err(_) => {
                    tracing::warn!(marker = %len_str, "malformed length marker, resynchronizing");
                    src.advance(after_prefix);
                    continue;
                }
            };

            let header_len = after_prefix + suffix_rel + MARKER_SUFFIX.len();
            let total_len = header_len + n;
            if src.len() < total_len {
                return Ok(None); // document truncated, wait for more bytes
            }

            let doc = &src[header_len..total_len];
            let request = match serde_json::from_slice::<Request>(doc) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(%err, "invalid request document, treating as UNKNOWN");
                    Request::Unknown
                }
            };
            src.advance(total_len);
            return Ok(Some(request));
        }
    }
}
