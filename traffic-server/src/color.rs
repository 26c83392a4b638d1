use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid color {0:?}: expected 6 or 8 hex digits")]
pub struct ColorError(pub String);

/// An RGB color with its alpha channel kept apart, so it can be written as
/// a separate `*-opacity` attribute instead of being blended in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    rgb: String,
    alpha: Option<u8>,
}

impl Color {
    /// Parses the query-string form: `RRGGBB` or `RRGGBBAA`, no `#`.
    pub fn from_hex_digits(digits: &str) -> Result<Self, ColorError> {
        let valid_len = digits.len() == 6 || digits.len() == 8;
        if !valid_len || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ColorError(digits.to_owned()));
        }

        let (rgb, alpha) = digits.split_at(6);
        let alpha = if alpha.is_empty() {
            None
        } else {
            Some(u8::from_str_radix(alpha, 16).map_err(|_| ColorError(digits.to_owned()))?)
        };

        Ok(Self {
            rgb: format!("#{rgb}"),
            alpha,
        })
    }

    /// `#rrggbb`, ready for a `fill` or `stroke` attribute.
    pub fn rgb(&self) -> &str {
        &self.rgb
    }

    pub fn opacity(&self) -> f64 {
        self.alpha.map_or(1.0, |a| f64::from(a) / 255.0)
    }
}

impl TryFrom<String> for Color {
    type Error = ColorError;

    /// Theme files spell colors with a leading `#`.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.strip_prefix('#') {
            Some(digits) => Self::from_hex_digits(digits),
            None => Err(ColorError(value)),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rgb)?;
        if let Some(alpha) = self.alpha {
            write!(f, "{alpha:02x}")?;
        }
        Ok(())
    }
}
