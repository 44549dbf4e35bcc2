//! Property-based tests for update framing and message bodies.
//!
//! Checks that any update survives the full sender path (frame, base64,
//! JSON wrapper) and that decoding never panics on arbitrary input.

use proptest::prelude::*;
use relay_proto::{CodecError, MessageBody, MessageCodec, RunId};

// =============================================================================
// STRATEGIES
// =============================================================================

fn run_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f0-9\\-]{1,36}").expect("valid regex")
}

fn update_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn wrapped_body_survives_relay_text(run in run_id_strategy(), id in any::<u64>(), update in update_strategy()) {
        let run = RunId::new(run);
        let text = MessageBody::wrap(&run, id, &update).to_text();
        let body = MessageBody::parse(&text).expect("parse");
        prop_assert_eq!(body.run_id(), Some(&run));
        let frame = body.decode_frame().expect("decode");
        prop_assert_eq!(frame.id, id);
        prop_assert_eq!(&frame.update[..], &update[..]);
    }

    #[test]
    fn frame_decode_never_panics(raw in prop::collection::vec(any::<u8>(), 0..64)) {
        match MessageCodec::decode(&raw) {
            Ok(frame) => prop_assert_eq!(frame.update.len(), raw.len() - MessageCodec::HEADER_LEN),
            Err(CodecError::Truncated { len, .. }) => prop_assert!(len < MessageCodec::HEADER_LEN),
            Err(CodecError::Version(v)) => prop_assert_ne!(v, MessageCodec::VERSION),
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    #[test]
    fn body_parse_never_panics(text in "\\PC{0,200}") {
        if let Ok(body) = MessageBody::parse(&text) {
            let _ = body.decode_frame();
        }
    }
}
