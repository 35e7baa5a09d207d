//! Normalization rules: pure, field-targeted transforms.

use mrdc_core::FieldIssue;
use mrdc_core::catalog::Rule;
use mrdc_core::value::Value;

use crate::dates::{parse_date, parse_time};
use crate::numeric::{coerce_float, coerce_int, float_to_int};
use crate::weight::{WeightClass, weight_in_grams};

/// A pure function from one field value to one value or a field issue
///
/// Null input passes through unchanged for every rule except
/// [`Rule::WeightClass`], which maps a missing weight to `Invalid`.
pub trait NormalizationRule {
    fn apply(&self, value: Value) -> Result<Value, FieldIssue>;
}

impl NormalizationRule for Rule {
    fn apply(&self, value: Value) -> Result<Value, FieldIssue> {
        if value.is_null() && !matches!(self, Rule::WeightClass) {
            return Ok(Value::Null);
        }
        match self {
            Rule::NullIf { tokens } => Ok(match value {
                Value::Text(s) if tokens.iter().any(|t| *t == s) => Value::Null,
                other => other,
            }),
            Rule::StripPunctuation => Ok(map_text(value, |s| {
                s.chars().filter(|c| !c.is_ascii_punctuation()).collect()
            })),
            Rule::Upper => Ok(map_text(value, |s| s.to_uppercase())),
            Rule::Remap { map } => Ok(match value {
                Value::Text(s) => map.get(&s).cloned().map_or(Value::Text(s), Value::Text),
                other => other,
            }),
            Rule::OneOf { values } => match value {
                Value::Text(s) if values.contains(&s) => Ok(Value::Text(s)),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::Uuid => match &value {
                Value::Text(s) => uuid::Uuid::parse_str(s.trim())
                    .map(|u| Value::Text(u.hyphenated().to_string()))
                    .map_err(|_| FieldIssue::Unparseable),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::Date => match value {
                Value::Text(s) => parse_date(&s).map(Value::Date),
                Value::Date(d) => Ok(Value::Date(d)),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::Time => match value {
                Value::Text(s) => parse_time(&s).map(Value::Time),
                Value::Time(t) => Ok(Value::Time(t)),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::Float => match value {
                Value::Text(s) => coerce_float(&s).map(Value::Float),
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Float(f) => Ok(Value::Float(f)),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::Int => match value {
                Value::Text(s) => coerce_int(&s).map(Value::Int),
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => float_to_int(f).map(Value::Int).ok_or(FieldIssue::Unparseable),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::Digits => match value {
                Value::Text(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                    Ok(Value::Text(s))
                }
                Value::Int(i) if i >= 0 => Ok(Value::Text(i.to_string())),
                _ => Err(FieldIssue::Unparseable),
            },
            // Already-gram-denominated numbers are returned unchanged.
            Rule::WeightGrams => match value {
                Value::Text(s) => weight_in_grams(&s).map(Value::Float),
                Value::Float(f) => Ok(Value::Float(f)),
                Value::Int(i) => Ok(Value::Float(i as f64)),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::BoolMap {
                true_tokens,
                false_tokens,
            } => match value {
                Value::Text(s) if true_tokens.contains(&s) => Ok(Value::Bool(true)),
                Value::Text(s) if false_tokens.contains(&s) => Ok(Value::Bool(false)),
                Value::Bool(b) => Ok(Value::Bool(b)),
                _ => Err(FieldIssue::Unparseable),
            },
            Rule::WeightClass => Ok(Value::text(WeightClass::from_grams(value.as_f64()).as_str())),
            Rule::FirstOf { chains } => first_of(chains, value),
        }
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        other => other,
    }
}

fn first_of(chains: &[Vec<Rule>], value: Value) -> Result<Value, FieldIssue> {
    let mut issue = FieldIssue::Unparseable;
    for chain in chains {
        match apply_chain(chain, value.clone()) {
            Ok(v) => return Ok(v),
            Err(FieldIssue::Ambiguous) => issue = FieldIssue::Ambiguous,
            Err(FieldIssue::Unparseable) => {}
        }
    }
    Err(issue)
}

/// Compose a chain: each rule receives the previous rule's output
pub fn apply_chain(rules: &[Rule], value: Value) -> Result<Value, FieldIssue> {
    rules.iter().try_fold(value, |v, rule| rule.apply(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> Value {
        Value::text(s)
    }

    fn availability() -> Rule {
        Rule::BoolMap {
            true_tokens: vec!["Still_available".into()],
            false_tokens: vec!["Removed".into()],
        }
    }

    #[test]
    fn availability_tokens_map_to_booleans() {
        let rule = availability();
        assert_eq!(rule.apply(text("Still_available")), Ok(Value::Bool(true)));
        assert_eq!(rule.apply(text("Removed")), Ok(Value::Bool(false)));
        assert_eq!(rule.apply(text("Unknown")), Err(FieldIssue::Unparseable));
        assert_eq!(rule.apply(Value::Null), Ok(Value::Null));
    }

    #[test]
    fn strip_punctuation_keeps_digit_sequences() {
        assert_eq!(
            Rule::StripPunctuation.apply(text("??4971858637664481")),
            Ok(text("4971858637664481"))
        );
        assert_eq!(
            Rule::StripPunctuation.apply(text("30?60?")),
            Ok(text("3060"))
        );
    }

    #[test]
    fn chain_composes_in_order() {
        let chain = vec![Rule::StripPunctuation, Rule::Digits];
        assert_eq!(apply_chain(&chain, text("?3560?")), Ok(text("3560")));
        assert_eq!(apply_chain(&chain, text("VISA 16")), Err(FieldIssue::Unparseable));
    }

    #[test]
    fn weight_chain_feeds_weight_class() {
        let grams = apply_chain(&[Rule::WeightGrams], text("1.2kg")).unwrap();
        assert_eq!(grams, Value::Float(1200.0));
        assert_eq!(Rule::WeightClass.apply(grams), Ok(text("Light")));
        assert_eq!(Rule::WeightClass.apply(Value::Null), Ok(text("Invalid")));
        assert_eq!(Rule::WeightClass.apply(text("heavy-ish")), Ok(text("Invalid")));
    }

    #[test]
    fn weight_grams_accepts_typed_numbers() {
        assert_eq!(Rule::WeightGrams.apply(Value::Float(532.5)), Ok(Value::Float(532.5)));
        assert_eq!(Rule::WeightGrams.apply(Value::Int(40)), Ok(Value::Float(40.0)));
    }

    #[test]
    fn first_of_takes_first_success() {
        let epoch = Rule::Remap {
            map: [("unknown".to_string(), "1970-01-01".to_string())].into(),
        };
        let rule = Rule::FirstOf {
            chains: vec![vec![Rule::Date], vec![epoch, Rule::Date]],
        };
        assert_eq!(
            rule.apply(text("2001-02-03")),
            Ok(Value::Date(NaiveDate::from_ymd_opt(2001, 2, 3).unwrap()))
        );
        assert_eq!(
            rule.apply(text("unknown")),
            Ok(Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()))
        );
        assert_eq!(rule.apply(text("03/04/2010")), Err(FieldIssue::Ambiguous));
    }

    #[test]
    fn categorical_rules() {
        let remap = Rule::Remap {
            map: [("GGB".to_string(), "GB".to_string())].into(),
        };
        assert_eq!(remap.apply(text("GGB")), Ok(text("GB")));
        assert_eq!(remap.apply(text("DE")), Ok(text("DE")));

        let one_of = Rule::OneOf {
            values: vec!["GB".into(), "DE".into(), "US".into()],
        };
        assert_eq!(one_of.apply(text("US")), Ok(text("US")));
        assert_eq!(one_of.apply(text("XQ")), Err(FieldIssue::Unparseable));

        let null_if = Rule::NullIf {
            tokens: vec!["-".into()],
        };
        assert_eq!(null_if.apply(text("-")), Ok(Value::Null));
    }

    #[test]
    fn uuid_is_canonicalised() {
        assert_eq!(
            Rule::Uuid.apply(text("93CAF182-E4E9-4C6E-BEBB-60A1A7DCF3B8")),
            Ok(text("93caf182-e4e9-4c6e-bebb-60a1a7dcf3b8"))
        );
        assert_eq!(Rule::Uuid.apply(text("not-a-uuid")), Err(FieldIssue::Unparseable));
    }

    #[test]
    fn numeric_rules_promote_and_demote() {
        assert_eq!(Rule::Float.apply(Value::Int(3)), Ok(Value::Float(3.0)));
        assert_eq!(Rule::Int.apply(Value::Float(4.0)), Ok(Value::Int(4)));
        assert_eq!(Rule::Int.apply(Value::Float(4.5)), Err(FieldIssue::Unparseable));
        assert_eq!(Rule::Float.apply(text("£12.50")), Ok(Value::Float(12.5)));
    }
}
