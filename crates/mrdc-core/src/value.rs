use chrono::{NaiveDate, NaiveTime};

/// A single field value on its way from raw text to a typed column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Float` values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Int(_) => "int64",
            Self::Float(_) => "float64",
            Self::Bool(_) => "boolean",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
        }
    }
}

impl From<Option<&str>> for Value {
    fn from(raw: Option<&str>) -> Self {
        raw.map_or(Self::Null, |s| Self::Text(s.to_string()))
    }
}
