//! Option value types and parsing.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Bool,
    Int,
    Enum,
    Color,
    Str,
}

/// Value constraints attached to an option at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    None,
    /// Inclusive bounds for int options.
    Range { min: i64, max: i64 },
    /// Allowed enumerants for enum options; the stored value is an index.
    Enum(Vec<String>),
}

/// The current (or default) value of an option. Always type-valid: parsing
/// happens before storage and enforces the constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    /// Index into the option's enumerant list.
    Enum(usize),
    /// Palette index 0..=255.
    Color(u8),
    /// `None` only for options declared null-allowed.
    Str(Option<String>),
}

impl OptionValue {
    pub fn ty(&self) -> OptionType {
        match self {
            OptionValue::Bool(_) => OptionType::Bool,
            OptionValue::Int(_) => OptionType::Int,
            OptionValue::Enum(_) => OptionType::Enum,
            OptionValue::Color(_) => OptionType::Color,
            OptionValue::Str(_) => OptionType::Str,
        }
    }

    /// Parse a raw string to a value of type `ty` under `constraint`.
    pub fn parse(
        ty: OptionType,
        raw: &str,
        constraint: &Constraint,
        null_allowed: bool,
    ) -> Result<OptionValue, ParseError> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        match ty {
            OptionType::Bool => match raw.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" | "1" => Ok(OptionValue::Bool(true)),
                "off" | "false" | "no" | "0" => Ok(OptionValue::Bool(false)),
                _ => Err(ParseError::BadBool),
            },
            OptionType::Int => {
                let n: i64 = raw.trim().parse().map_err(|_| ParseError::BadInt)?;
                if let Constraint::Range { min, max } = constraint {
                    if n < *min || n > *max {
                        return Err(ParseError::OutOfRange {
                            min: *min,
                            max: *max,
                        });
                    }
                }
                Ok(OptionValue::Int(n))
            }
            OptionType::Enum => {
                let Constraint::Enum(values) = constraint else {
                    return Err(ParseError::BadEnum);
                };
                values
                    .iter()
                    .position(|v| v.eq_ignore_ascii_case(raw.trim()))
                    .map(OptionValue::Enum)
                    .ok_or(ParseError::BadEnum)
            }
            OptionType::Color => parse_color(raw.trim())
                .map(OptionValue::Color)
                .ok_or(ParseError::BadColor),
            OptionType::Str => {
                if raw == "null" && null_allowed {
                    Ok(OptionValue::Str(None))
                } else {
                    Ok(OptionValue::Str(Some(raw.to_owned())))
                }
            }
        }
    }

    /// String form for writing to disk and for display.
    pub fn render(&self, constraint: &Constraint) -> String {
        match self {
            OptionValue::Bool(true) => "on".to_owned(),
            OptionValue::Bool(false) => "off".to_owned(),
            OptionValue::Int(n) => n.to_string(),
            OptionValue::Enum(idx) => match constraint {
                Constraint::Enum(values) => values
                    .get(*idx)
                    .cloned()
                    .unwrap_or_else(|| idx.to_string()),
                _ => idx.to_string(),
            },
            OptionValue::Color(c) => color_name(*c)
                .map(str::to_owned)
                .unwrap_or_else(|| c.to_string()),
            OptionValue::Str(Some(s)) => s.clone(),
            OptionValue::Str(None) => "null".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    BadBool,
    BadInt,
    OutOfRange { min: i64, max: i64 },
    BadEnum,
    BadColor,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::BadBool => write!(f, "expected on/off"),
            ParseError::BadInt => write!(f, "expected an integer"),
            ParseError::OutOfRange { min, max } => {
                write!(f, "value out of range [{}, {}]", min, max)
            }
            ParseError::BadEnum => write!(f, "not one of the allowed values"),
            ParseError::BadColor => write!(f, "unknown color"),
        }
    }
}

/// The 16 named palette entries; higher indices are numeric only.
static COLOR_NAMES: [&str; 16] = [
    "default", "black", "red", "green", "brown", "blue", "magenta", "cyan", "gray", "darkgray",
    "lightred", "lightgreen", "yellow", "lightblue", "lightmagenta", "lightcyan",
];

pub fn parse_color(raw: &str) -> Option<u8> {
    if let Some(idx) = COLOR_NAMES
        .iter()
        .position(|n| n.eq_ignore_ascii_case(raw))
    {
        return Some(idx as u8);
    }
    raw.parse::<u8>().ok()
}

pub fn color_name(idx: u8) -> Option<&'static str> {
    COLOR_NAMES.get(idx as usize).copied()
}
