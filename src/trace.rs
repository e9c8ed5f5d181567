//! W3C `traceparent` decoding for the consumer side of the broker hop
//! (spec §4.4 step 1, SPEC_FULL §4.3 "no framework does this hop for us —
//! this is core, not ambient"). The Publisher writes the header in
//! `publisher::build_properties`; this is its inverse.

use lapin::types::{AMQPValue, FieldTable};

/// A decoded `traceparent` header: `00-{trace_id}-{parent_span_id}-{flags}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: String,
    pub parent_span_id: String,
}

/// Parses a `traceparent` value, rejecting anything that isn't the
/// 4-field `version-traceid-spanid-flags` shape this crate writes.
pub fn parse_traceparent(value: &str) -> Option<TraceParent> {
    let mut parts = value.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let parent_span_id = parts.next()?;
    let _flags = parts.next()?;
    if parts.next().is_some() || version != "00" || trace_id.is_empty() || parent_span_id.is_empty() {
        return None;
    }
    Some(TraceParent {
        trace_id: trace_id.to_string(),
        parent_span_id: parent_span_id.to_string(),
    })
}

/// Extracts and parses `traceparent` out of AMQP basic-properties headers.
pub fn extract_traceparent(headers: Option<&FieldTable>) -> Option<TraceParent> {
    let headers = headers?;
    match headers.inner().get("traceparent")? {
        AMQPValue::LongString(s) => parse_traceparent(s.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_traceparent() {
        let parsed = parse_traceparent("00-abcdef0123456789abcdef0123456789-0123456789abcdef-01").unwrap();
        assert_eq!(parsed.trace_id, "abcdef0123456789abcdef0123456789");
        assert_eq!(parsed.parent_span_id, "0123456789abcdef");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(parse_traceparent("00-abc-def").is_none());
        assert!(parse_traceparent("00-abc-def-01-extra").is_none());
    }

    #[test]
    fn rejects_unsupported_version() {
        assert!(parse_traceparent("01-abc-def-01").is_none());
    }

    #[test]
    fn extract_returns_none_without_headers() {
        assert!(extract_traceparent(None).is_none());
    }
}
