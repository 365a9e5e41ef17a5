//! Transport-safe encoding of record payloads and headers.
//!
//! Bytes travel to and from clients as base64 text. Decoding accepts input
//! with or without `=` padding.

use std::collections::HashSet;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use dlq_api::headers::HeaderMap;
use dlq_api::model::FetchedRecord;
use dlq_api::record::BrokerRecord;

use crate::error::DlqError;

const ENCODER: GeneralPurpose = base64::engine::general_purpose::STANDARD;

const DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// More control characters than this and the bytes are treated as binary.
const MAX_CONTROL_CHARS: usize = 2;

// ═══════════════════════════════════════════════════════════════
//  Text heuristic
// ═══════════════════════════════════════════════════════════════

/// Decode bytes as UTF-8 text if they look like text.
///
/// Invalid sequences decode to U+FFFD. A char counts as control iff it is below
/// 0x09 or in (0x0D, 0x20); more than two of them means binary and yields `None`.
pub fn try_decode_utf8(bytes: Option<&[u8]>) -> Option<String> {
    let bytes = bytes?;
    let text = String::from_utf8_lossy(bytes);
    let controls = text.chars().filter(|&c| is_control(c)).count();
    tracing::trace!(controls, len = bytes.len(), "text heuristic");
    if controls > MAX_CONTROL_CHARS {
        None
    } else {
        Some(text.into_owned())
    }
}

fn is_control(c: char) -> bool {
    let c = u32::from(c);
    c < 0x09 || (c > 0x0D && c < 0x20)
}

// ═══════════════════════════════════════════════════════════════
//  Payload
// ═══════════════════════════════════════════════════════════════

pub fn encode_bytes(bytes: &[u8]) -> String {
    ENCODER.encode(bytes)
}

pub fn decode_bytes(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    DECODER.decode(text)
}

/// Decode an optional encoded payload. `None` stays `None` (null payload).
pub fn decode_payload(encoded: Option<&str>) -> Result<Option<Vec<u8>>, base64::DecodeError> {
    encoded.map(decode_bytes).transpose()
}

// ═══════════════════════════════════════════════════════════════
//  Headers
// ═══════════════════════════════════════════════════════════════

/// Encode broker headers, preserving wire order.
///
/// A repeated name keeps its first position and its last value. A null value
/// encodes as the empty string.
pub fn encode_headers(raw: &[(String, Option<Vec<u8>>)]) -> HeaderMap<String> {
    raw.iter()
        .map(|(name, value)| {
            let encoded = value.as_deref().map(encode_bytes).unwrap_or_default();
            (name.as_str(), encoded)
        })
        .collect()
}

/// Keep only allowed headers and decode them.
///
/// Absent input yields an empty map. A decode failure on an allowed header is
/// an error; disallowed headers are never decoded.
pub fn filter_and_decode(
    encoded: Option<&HeaderMap<String>>,
    allow: &HashSet<String>,
) -> Result<HeaderMap<Vec<u8>>, DlqError> {
    let Some(encoded) = encoded else {
        tracing::debug!("no headers to filter");
        return Ok(HeaderMap::new());
    };

    let mut out = HeaderMap::with_capacity(encoded.len().min(allow.len()));
    for (name, value) in encoded.iter() {
        if !allow.contains(name) {
            tracing::trace!(header = %name, "header dropped, not allowed");
            continue;
        }
        let bytes = decode_bytes(value).map_err(|e| DlqError::InvalidEncoding {
            header: name.to_string(),
            reason: e.to_string(),
            offset: None,
            completed: 0,
        })?;
        tracing::trace!(header = %name, "header kept");
        out.insert(name, bytes);
    }

    tracing::debug!(kept = out.len(), total = encoded.len(), "filtered headers");
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════
//  Record view
// ═══════════════════════════════════════════════════════════════

/// Build the client view of a polled record.
pub fn to_fetched(record: BrokerRecord) -> FetchedRecord {
    let headers = encode_headers(&record.headers);
    let key_utf8 = try_decode_utf8(record.key.as_deref());
    let value_utf8 = try_decode_utf8(record.value.as_deref());
    let value_base64 = record.value.as_deref().map(encode_bytes);

    tracing::trace!(
        topic = %record.topic,
        partition = record.partition,
        offset = record.offset,
        key_text = key_utf8.is_some(),
        value_text = value_utf8.is_some(),
        headers = headers.len(),
        "mapped record"
    );

    FetchedRecord {
        topic: record.topic,
        partition: record.partition,
        offset: record.offset,
        timestamp: record.timestamp,
        key_utf8,
        value_utf8,
        value_base64,
        headers,
    }
}
