//! Numeric coercion for price, quantity and count fields.

use mrdc_core::FieldIssue;

/// Strip currency symbols, letter suffixes and thousands separators
///
/// Keeps ASCII digits, one decimal point and a minus sign that comes before
/// any digit. A second decimal point or a minus sign after a digit makes the
/// value unparseable rather than a different number.
pub fn clean_numeric(raw: &str) -> Result<String, FieldIssue> {
    let mut out = String::with_capacity(raw.len());
    let mut seen_digit = false;
    let mut seen_point = false;
    for c in raw.trim().chars() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                out.push(c);
            }
            '.' if seen_point => return Err(FieldIssue::Unparseable),
            '.' => {
                seen_point = true;
                out.push(c);
            }
            '-' if seen_digit || !out.is_empty() => return Err(FieldIssue::Unparseable),
            '-' => out.push(c),
            _ => {}
        }
    }
    Ok(out)
}

pub fn coerce_float(raw: &str) -> Result<f64, FieldIssue> {
    let cleaned = clean_numeric(raw)?;
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return Err(FieldIssue::Unparseable);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or(FieldIssue::Unparseable)
}

/// Integer coercion; a float with a zero fraction (`"3.0"`) is accepted
pub fn coerce_int(raw: &str) -> Result<i64, FieldIssue> {
    let cleaned = clean_numeric(raw)?;
    if let Ok(i) = cleaned.parse::<i64>() {
        return Ok(i);
    }
    let f = coerce_float(raw)?;
    float_to_int(f).ok_or(FieldIssue::Unparseable)
}

pub fn float_to_int(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_artifacts_before_parsing() {
        assert_eq!(coerce_float("£9.99"), Ok(9.99));
        assert_eq!(coerce_float("1,299.50"), Ok(1299.5));
        assert_eq!(coerce_float("-0.1346"), Ok(-0.1346));
        assert_eq!(coerce_int("J78"), Ok(78));
        assert_eq!(coerce_int("3n9"), Ok(39));
        assert_eq!(coerce_int(" 12 "), Ok(12));
    }

    #[test]
    fn float_strings_with_zero_fraction_are_ints() {
        assert_eq!(coerce_int("3.0"), Ok(3));
        assert_eq!(coerce_int("3.5"), Err(FieldIssue::Unparseable));
    }

    #[test]
    fn unparseable_values() {
        for raw in ["", "N/A", "abc", "-", "."] {
            assert_eq!(coerce_float(raw), Err(FieldIssue::Unparseable), "{raw}");
            assert_eq!(coerce_int(raw), Err(FieldIssue::Unparseable), "{raw}");
        }
    }

    #[test]
    fn minus_sign_only_leading() {
        assert_eq!(clean_numeric("-5"), Ok("-5".to_string()));
        assert_eq!(clean_numeric("£-5"), Ok("-5".to_string()));
        assert_eq!(clean_numeric("12-34"), Err(FieldIssue::Unparseable));
        assert_eq!(coerce_int("12-34"), Err(FieldIssue::Unparseable));
        assert_eq!(coerce_float("--5"), Err(FieldIssue::Unparseable));
    }

    #[test]
    fn second_decimal_point_is_unparseable() {
        assert_eq!(clean_numeric("1.2.3"), Err(FieldIssue::Unparseable));
        assert_eq!(coerce_float("1.2.3"), Err(FieldIssue::Unparseable));
        assert_eq!(coerce_float("£1.2"), Ok(1.2));
    }
}
