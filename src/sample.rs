/// Size of the inspection window read before guessing the encoding and
/// dialect of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSize {
    /// Sample a specific number of lines.
    Records(usize),
    /// Sample a specific number of bytes.
    Bytes(usize),
    /// Read the entire source.
    ///
    /// # Warning
    ///
    /// On a non-seekable source every line read while sampling is held in
    /// memory until the reader drains it. Prefer a bounded sample for large
    /// streams.
    All,
}

impl Default for SampleSize {
    fn default() -> Self {
        // 100 lines is enough for the statistical guesser on most files
        SampleSize::Records(100)
    }
}

impl SampleSize {
    /// Returns true once `lines` lines totalling `bytes` bytes satisfy the
    /// sample.
    pub fn is_satisfied(&self, lines: usize, bytes: usize) -> bool {
        match self {
            SampleSize::Records(n) => lines >= *n,
            SampleSize::Bytes(n) => bytes >= *n,
            SampleSize::All => false,
        }
    }

    /// The leading part of `text` covered by this sample.
    pub fn slice<'t>(&self, text: &'t str) -> &'t str {
        match self {
            SampleSize::All => text,
            SampleSize::Bytes(n) => {
                let mut end = (*n).min(text.len());
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                &text[..end]
            }
            SampleSize::Records(0) => "",
            SampleSize::Records(n) => {
                let end = text
                    .match_indices('\n')
                    .nth(n - 1)
                    .map_or(text.len(), |(i, _)| i + 1);
                &text[..end]
            }
        }
    }
}
