//! Inbound payload normalisation.
//!
//! Every maximal run of `\r`/`\n` bytes collapses to a single space, then
//! surrounding ASCII whitespace is trimmed. The result contains no line
//! terminators, which keeps the write pump's newline-delimited coalescing
//! unambiguous. Applying it twice yields the same bytes as applying it once.

use bytes::Bytes;

fn is_line_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Normalise an inbound payload.
pub fn normalize(input: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(input.len());
    let mut in_break = false;
    for &byte in input {
        if is_line_terminator(byte) {
            if !in_break {
                out.push(b' ');
                in_break = true;
            }
        } else {
            out.push(byte);
            in_break = false;
        }
    }
    Bytes::copy_from_slice(out.trim_ascii())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trailing_newline_removed_interior_replaced() {
        assert_eq!(normalize(b"hello\nworld\n"), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn crlf_runs_collapse_to_one_space() {
        assert_eq!(normalize(b"a\r\n\r\nb"), Bytes::from_static(b"a b"));
    }

    #[test]
    fn already_clean_payload_unchanged() {
        let payload = br#"{"msg":"hi"}"#;
        assert_eq!(normalize(payload), Bytes::from_static(payload));
    }

    #[test]
    fn only_terminators_becomes_empty() {
        assert!(normalize(b"\n\r\n").is_empty());
    }

    proptest! {
        #[test]
        fn idempotent(input in proptest::collection::vec(any::<u8>(), 0..256)) {
            let once = normalize(&input);
            let twice = normalize(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn no_line_terminators_survive(input in "[a-z \r\n\t]{0,64}") {
            let out = normalize(input.as_bytes());
            prop_assert!(!out.iter().copied().any(is_line_terminator));
        }
    }
}
