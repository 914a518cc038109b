//! Delimiter and enclosure guessing from the first line of a sample.

use crate::dialect::Quote;

/// Delimiters counted in the first line.
pub const DELIMITER_CANDIDATES: &[u8] = b",;:|\t";

/// Enclosures considered, most common first. The empty enclosure has no
/// `q + delimiter + q` pattern to count, so it is only ever selected by
/// explicit configuration.
pub const ENCLOSURE_CANDIDATES: &[Quote] = &[Quote::Some(b'"'), Quote::Some(b'\''), Quote::None];

/// Pick the candidate that occurs most often in `first_line`.
///
/// Returns `None` when the highest count is shared by two candidates or no
/// candidate occurs at all.
pub fn guess_delimiter(first_line: &str, candidates: &[u8]) -> Option<u8> {
    let bytes = first_line.as_bytes();
    let mut best: Option<(u8, usize)> = None;
    let mut tied = false;

    for &candidate in candidates {
        let count = bytecount::count(bytes, candidate);
        match best {
            Some((_, top)) if count < top => {}
            Some((_, top)) if count == top => tied = true,
            _ => {
                best = Some((candidate, count));
                tied = false;
            }
        }
    }

    match best {
        Some((delimiter, count)) if count > 0 && !tied => Some(delimiter),
        _ => None,
    }
}

/// Pick the enclosure whose `q + delimiter + q` pattern occurs most often.
///
/// Ties go to the earlier candidate in [`ENCLOSURE_CANDIDATES`]. Returns
/// `None` when no pattern occurs, leaving the default in place.
pub fn guess_enclosure(first_line: &str, delimiter: u8) -> Option<Quote> {
    let bytes = first_line.as_bytes();
    ENCLOSURE_CANDIDATES
        .iter()
        .filter_map(|&quote| {
            let q = quote.char()?;
            let count = bytes
                .windows(3)
                .filter(|w| w[0] == q && w[1] == delimiter && w[2] == q)
                .count();
            Some((quote, count))
        })
        .fold(None, |best: Option<(Quote, usize)>, (quote, count)| match best {
            Some((_, top)) if count <= top => best,
            _ => Some((quote, count)),
        })
        .filter(|&(_, count)| count > 0)
        .map(|(quote, _)| quote)
}
