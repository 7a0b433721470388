use crate::config::round_up;
use crate::error::ConfigError;

/// Padding value. Zero is the identity for sum, so padding never changes a
/// sum's result; the device-side clear of Output writes the same value.
pub const NEUTRAL: f32 = 0.0;

/// The numbers to reduce, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    values: Vec<f32>,
}

impl Dataset {
    /// Parses newline-separated decimal numbers.
    ///
    /// Tokens are trimmed; blank lines (including a trailing newline) are
    /// skipped. Anything else that is not a number is an error.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut values = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let token = line.trim();
            if token.is_empty() {
                continue;
            }
            let value = token.parse::<f32>().map_err(|_| ConfigError::MalformedNumber {
                line: i + 1,
                token: token.to_string(),
            })?;
            values.push(value);
        }
        Self::from_values(values)
    }

    pub fn from_values(values: Vec<f32>) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::EmptyInput);
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; construction rejects empty input.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Length after padding to a multiple of `workgroup_size`.
    pub fn padded_len(&self, workgroup_size: u32) -> usize {
        round_up(self.values.len(), workgroup_size as usize)
    }

    /// The values followed by [`NEUTRAL`] up to [`Dataset::padded_len`].
    pub fn padded(&self, workgroup_size: u32) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.padded_len(workgroup_size));
        out.extend_from_slice(&self.values);
        out.resize(self.padded_len(workgroup_size), NEUTRAL);
        out
    }
}
