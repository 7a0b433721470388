use std::fmt;

/// Why a kernel source could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandErrorKind {
    /// `$<name>` refers to a constant that was not supplied.
    Unresolved(String),
    /// `$<>` has no name to look up.
    EmptyName,
}

/// A preprocessing error, located in the unexpanded source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandError {
    pub kind: ExpandErrorKind,
    /// 1-based source line of the placeholder.
    pub line: usize,
    /// 1-based source column (in chars) of the `$`.
    pub col: usize,
}

impl ExpandError {
    pub(crate) fn new(kind: ExpandErrorKind, src: &str, offset: usize) -> Self {
        let (line, col) = line_col(src, offset);
        Self { kind, line, col }
    }
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpandErrorKind::Unresolved(name) => write!(
                f,
                "kernel placeholder at {}:{}: no constant named {:?}",
                self.line, self.col, name
            ),
            ExpandErrorKind::EmptyName => {
                write!(f, "kernel placeholder at {}:{}: empty name", self.line, self.col)
            }
        }
    }
}

impl std::error::Error for ExpandError {}

/// Converts a byte offset into a 1-based `(line, col)` pair.
pub(crate) fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let before = &src[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let col = before[line_start..].chars().count() + 1;
    (line, col)
}
