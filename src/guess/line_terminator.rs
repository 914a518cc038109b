//! Line separator detection.

use crate::dialect::LineTerminator;

/// Detect the line separator of `sample`.
///
/// Each kind is searched across the whole sample, in precedence order:
/// CRLF, LF followed by anything but CR, a lone CR, and the reversed LFCR
/// pair. A final LF with nothing after it only decides the result when no
/// other break matched, since a sample cut after LF may hide an LFCR pair.
/// The matched terminator is used for the whole stream. Returns `None` when
/// the sample contains no line break.
pub fn detect_line_terminator(sample: &str) -> Option<LineTerminator> {
    let bytes = sample.as_bytes();
    let before = |i: usize| i.checked_sub(1).map(|p| bytes[p]);
    let after = |i: usize| bytes.get(i + 1).copied();
    let breaks = || {
        bytes
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b == b'\n' || b == b'\r')
            .map(|(i, &b)| (i, b))
    };

    if breaks().any(|(i, b)| b == b'\r' && after(i) == Some(b'\n')) {
        return Some(LineTerminator::CRLF);
    }
    if breaks().any(|(i, b)| b == b'\n' && after(i).is_some_and(|n| n != b'\r')) {
        return Some(LineTerminator::LF);
    }
    if breaks().any(|(i, b)| b == b'\r' && before(i) != Some(b'\n')) {
        return Some(LineTerminator::CR);
    }
    if breaks().any(|(i, b)| b == b'\n' && after(i) == Some(b'\r')) {
        return Some(LineTerminator::LFCR);
    }
    breaks().next().map(|_| LineTerminator::LF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_line_terminator() {
        assert_eq!(detect_line_terminator("a,b\nc,d\n"), Some(LineTerminator::LF));
        assert_eq!(detect_line_terminator("a,b\r\nc,d\r\n"), Some(LineTerminator::CRLF));
        assert_eq!(detect_line_terminator("a,b\rc,d\r"), Some(LineTerminator::CR));
        assert_eq!(detect_line_terminator("a,b\n\rc,d\n\r"), Some(LineTerminator::LFCR));
        assert_eq!(detect_line_terminator("a,b"), None);
    }

    #[test]
    fn test_precedence_over_whole_sample() {
        // A CRLF anywhere outranks an earlier bare LF
        assert_eq!(detect_line_terminator("a\nb\r\nc"), Some(LineTerminator::CRLF));
        assert_eq!(detect_line_terminator("a\rb\nc"), Some(LineTerminator::LF));
        assert_eq!(detect_line_terminator("a,b\r"), Some(LineTerminator::CR));
    }

    #[test]
    fn test_trailing_lf_does_not_hide_lfcr() {
        assert_eq!(detect_line_terminator("a\n\rb\n"), Some(LineTerminator::LFCR));
        assert_eq!(detect_line_terminator("a,b\n"), Some(LineTerminator::LF));
    }
}
