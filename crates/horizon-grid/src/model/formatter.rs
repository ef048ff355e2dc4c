//! Cell text formatting shared by every backing model.

use serde::{Deserialize, Serialize};

use super::value::{ColumnType, Value};

/// Formatting rules for turning cell values into display text.
///
/// A formatter is handed unchanged to every model the factory builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Formatter {
    /// Fixed number of decimal places for doubles; `None` prints the shortest form.
    pub decimal_places: Option<usize>,
    /// Insert thousands separators into numbers.
    pub thousands_separator: bool,
    /// Text shown for null cells.
    pub null_text: String,
    /// Text shown for `true` values.
    pub true_text: String,
    /// Text shown for `false` values.
    pub false_text: String,
    /// Truncate strings longer than this many characters.
    pub max_text_length: Option<usize>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self {
            decimal_places: None,
            thousands_separator: false,
            null_text: String::new(),
            true_text: "true".to_string(),
            false_text: "false".to_string(),
            max_text_length: None,
        }
    }
}

impl Formatter {
    /// Creates a formatter with default rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the decimal places used for doubles.
    pub fn with_decimal_places(mut self, places: usize) -> Self {
        self.decimal_places = Some(places);
        self
    }

    /// Enables thousands separators.
    pub fn with_thousands_separator(mut self, enabled: bool) -> Self {
        self.thousands_separator = enabled;
        self
    }

    /// Sets the text shown for nulls.
    pub fn with_null_text(mut self, text: impl Into<String>) -> Self {
        self.null_text = text.into();
        self
    }

    /// Formats a value of the given column type.
    pub fn format(&self, value: &Value, column_type: ColumnType) -> String {
        match value {
            Value::Null => self.null_text.clone(),
            Value::Bool(true) => self.true_text.clone(),
            Value::Bool(false) => self.false_text.clone(),
            Value::Int(i) if column_type == ColumnType::Double => self.format_double(*i as f64),
            Value::Int(i) => self.group(i.to_string()),
            Value::Double(d) => self.format_double(*d),
            Value::String(s) => match self.max_text_length {
                Some(max) if s.chars().count() > max => {
                    let mut text: String = s.chars().take(max).collect();
                    text.push('…');
                    text
                }
                _ => s.clone(),
            },
        }
    }

    fn format_double(&self, value: f64) -> String {
        if !value.is_finite() {
            return value.to_string();
        }
        let text = match self.decimal_places {
            Some(places) => format!("{value:.places$}"),
            None => value.to_string(),
        };
        self.group(text)
    }

    fn group(&self, text: String) -> String {
        if !self.thousands_separator {
            return text;
        }
        let (sign, rest) = match text.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", text.as_str()),
        };
        let (int_part, frac_part) = match rest.find('.') {
            Some(dot) => rest.split_at(dot),
            None => (rest, ""),
        };
        let mut grouped = String::with_capacity(text.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("{sign}{grouped}{frac_part}")
    }
}
