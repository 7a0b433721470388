use std::ops::Range;

use crate::error::{ExpandError, ExpandErrorKind};

// ── Placeholder ───────────────────────────────────────────────────────────

/// One `$<name>` occurrence located in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'s> {
    pub name: &'s str,
    /// Byte range of the whole token, `$` through `>`.
    pub span: Range<usize>,
}

// ── Scanner ───────────────────────────────────────────────────────────────

/// Single forward scan over a kernel source collecting placeholder spans.
///
/// A placeholder is `$<` followed by `[A-Za-z0-9_]*` and a closing `>`.
/// Anything else starting with `$` is literal text. Spans are returned in
/// source order and never overlap.
pub struct Scanner<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Scanner<'s> {
    pub fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn placeholders(mut self) -> Result<Vec<Placeholder<'s>>, ExpandError> {
        let mut found = Vec::new();
        while let Some(p) = self.next_placeholder()? {
            found.push(p);
        }
        Ok(found)
    }

    fn next_placeholder(&mut self) -> Result<Option<Placeholder<'s>>, ExpandError> {
        let bytes = self.src.as_bytes();
        while let Some(rel) = self.src[self.pos..].find("$<") {
            let start = self.pos + rel;
            let name_start = start + 2;
            let mut end = name_start;
            while end < bytes.len() && is_name_byte(bytes[end]) {
                end += 1;
            }

            if bytes.get(end) != Some(&b'>') {
                // `$<` not closed by a name + `>`: literal text, resume after the `$`.
                self.pos = start + 1;
                continue;
            }

            if end == name_start {
                return Err(ExpandError::new(ExpandErrorKind::EmptyName, self.src, start));
            }

            self.pos = end + 1;
            return Ok(Some(Placeholder {
                name: &self.src[name_start..end],
                span: start..end + 1,
            }));
        }
        self.pos = self.src.len();
        Ok(None)
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
