use std::collections::BTreeMap;
use std::fmt::Display;

use crate::error::{ExpandError, ExpandErrorKind};
use crate::scan::Scanner;

/// Named values substituted into `$<name>` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constants(BTreeMap<String, String>);

impl Constants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` stringified under `name`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Display) -> &mut Self {
        self.0.insert(name.into(), value.to_string());
        self
    }

    /// Builder form of [`Constants::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Copies every entry of `other` into `self`; `other` wins on conflicts.
    pub fn extend_from(&mut self, other: &Constants) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Substitutes every `$<name>` in `source` with its value from `constants`.
///
/// Placeholders are located once, up front, in the original text; the output is
/// assembled by interleaving the literal spans with substituted values. Values
/// that themselves look like placeholders are copied verbatim and are never
/// expanded again. Every placeholder must resolve.
pub fn expand(source: &str, constants: &Constants) -> Result<String, ExpandError> {
    let placeholders = Scanner::new(source).placeholders()?;
    if placeholders.is_empty() {
        return Ok(source.to_string());
    }

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for p in &placeholders {
        let value = constants.get(p.name).ok_or_else(|| {
            ExpandError::new(ExpandErrorKind::Unresolved(p.name.to_string()), source, p.span.start)
        })?;
        out.push_str(&source[cursor..p.span.start]);
        out.push_str(value);
        cursor = p.span.end;
    }
    out.push_str(&source[cursor..]);
    Ok(out)
}
