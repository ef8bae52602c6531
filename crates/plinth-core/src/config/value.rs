//! Typed value conversion for configuration entries.
//!
//! Values inside a [`Configuration`](crate::config::Configuration) are
//! stored as already-serialized text. [`ConfigurationValue`] is the seam
//! between that text and typed scalars: the engine calls it on every typed
//! read and write, and callers with custom types implement it themselves.
//! Formats are selected per call through [`ValueFlags`]; the empty flag set
//! means "default format".

use bitflags::bitflags;

bitflags! {
    /// Format variants for a single typed read or write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ValueFlags: u8 {
        /// Integers with a leading `0`, base 8.
        const OCT = 0b0001;
        /// Integers with a leading `0x`, base 16.
        const HEX = 0b0010;
        /// Integers as `#rrggbb` color values, six lowercase hex digits.
        const COLOR = 0b0100;
        /// Floating point in scientific notation with an explicit exponent
        /// sign, `Ne+MM` / `Ne-MM`.
        const SCIENTIFIC = 0b1000;
    }
}

/// Conversion between a scalar and its configuration-file text form.
///
/// `from_conf` receives the stored text exactly as serialized (for strings
/// that includes surrounding quotes); `to_conf` must produce text that
/// `from_conf` accepts back under the same flags.
pub trait ConfigurationValue: Sized + Default {
    /// Serialize into configuration text.
    fn to_conf(&self, flags: ValueFlags) -> String;

    /// Parse from configuration text. `None` when the text does not parse
    /// under the given flags.
    fn from_conf(text: &str, flags: ValueFlags) -> Option<Self>;
}

macro_rules! impl_integer_value {
    ($($t:ty),*) => {$(
        impl ConfigurationValue for $t {
            fn to_conf(&self, flags: ValueFlags) -> String {
                if flags.contains(ValueFlags::COLOR) {
                    format!("#{:06x}", self)
                } else if flags.contains(ValueFlags::HEX) {
                    format!("0x{:x}", self)
                } else if flags.contains(ValueFlags::OCT) {
                    format!("0{:o}", self)
                } else {
                    self.to_string()
                }
            }

            fn from_conf(text: &str, flags: ValueFlags) -> Option<Self> {
                if flags.contains(ValueFlags::COLOR) {
                    <$t>::from_str_radix(text.strip_prefix('#')?, 16).ok()
                } else if flags.contains(ValueFlags::HEX) {
                    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
                    <$t>::from_str_radix(digits, 16).ok()
                } else if flags.contains(ValueFlags::OCT) {
                    <$t>::from_str_radix(text, 8).ok()
                } else {
                    text.parse().ok()
                }
            }
        }
    )*};
}

impl_integer_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_float_value {
    ($($t:ty),*) => {$(
        impl ConfigurationValue for $t {
            fn to_conf(&self, flags: ValueFlags) -> String {
                if flags.contains(ValueFlags::SCIENTIFIC) {
                    scientific(format!("{:e}", self))
                } else {
                    self.to_string()
                }
            }

            fn from_conf(text: &str, _flags: ValueFlags) -> Option<Self> {
                text.parse().ok()
            }
        }
    )*};
}

impl_float_value!(f32, f64);

/// `{:e}` omits the sign of non-negative exponents; the file format always
/// carries one.
fn scientific(mut text: String) -> String {
    if let Some(pos) = text.rfind('e') {
        if !matches!(text.as_bytes().get(pos + 1), Some(b'+') | Some(b'-')) {
            text.insert(pos + 1, '+');
        }
    }
    text
}

impl ConfigurationValue for bool {
    fn to_conf(&self, _flags: ValueFlags) -> String {
        if *self { "true".into() } else { "false".into() }
    }

    fn from_conf(text: &str, _flags: ValueFlags) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        }
    }
}

impl ConfigurationValue for String {
    fn to_conf(&self, _flags: ValueFlags) -> String {
        let edge_whitespace = self
            .chars()
            .next()
            .map_or(false, char::is_whitespace)
            || self.chars().last().map_or(false, char::is_whitespace);
        if edge_whitespace || self.contains('"') {
            let mut quoted = String::with_capacity(self.len() + 2);
            quoted.push('"');
            for c in self.chars() {
                if c == '"' || c == '\\' {
                    quoted.push('\\');
                }
                quoted.push(c);
            }
            quoted.push('"');
            quoted
        } else {
            self.clone()
        }
    }

    fn from_conf(text: &str, _flags: ValueFlags) -> Option<Self> {
        let Some(interior) = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .filter(|_| text.len() >= 2)
        else {
            return Some(text.to_string());
        };
        let mut unescaped = String::with_capacity(interior.len());
        let mut chars = interior.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(next @ ('"' | '\\')) => unescaped.push(next),
                    Some(next) => {
                        unescaped.push('\\');
                        unescaped.push(next);
                    }
                    None => unescaped.push('\\'),
                }
            } else {
                unescaped.push(c);
            }
        }
        Some(unescaped)
    }
}
