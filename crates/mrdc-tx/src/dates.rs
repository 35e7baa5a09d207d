//! Date and time parsing.
//!
//! Formats are tried from most specific to most permissive. The order is
//! load-bearing: an ambiguous string must not be claimed by a loose pattern
//! before a strict one had its chance.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use mrdc_core::FieldIssue;
use tracing::debug;

/// Strict formats, in trial order: `2005-10-23`, `1968 October 16`, `July 1961 14`
pub const STRICT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y %B %d", "%B %Y %d"];

/// Free-form formats tried after the strict ones
const PERMISSIVE_DATE_FORMATS: [&str; 6] = [
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d %B %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

const PERMISSIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];

/// Parse a calendar date
///
/// Returns `FieldIssue::Ambiguous` for numeric day/month strings that read
/// validly both ways (`03/04/2010`), and `FieldIssue::Unparseable` when no
/// format matches.
pub fn parse_date(raw: &str) -> Result<NaiveDate, FieldIssue> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(FieldIssue::Unparseable);
    }
    for format in STRICT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }
    parse_permissive(s)
}

fn parse_permissive(s: &str) -> Result<NaiveDate, FieldIssue> {
    for format in PERMISSIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }
    for format in PERMISSIVE_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(datetime.date());
        }
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Ok(datetime.date_naive());
    }
    numeric_day_month(s)
}

/// `a/b/YYYY` with either day-first or month-first order
fn numeric_day_month(s: &str) -> Result<NaiveDate, FieldIssue> {
    let parts: Vec<&str> = s.split(['/', '-', '.']).collect();
    let [a, b, year] = parts.as_slice() else {
        return Err(FieldIssue::Unparseable);
    };
    if year.len() != 4 {
        return Err(FieldIssue::Unparseable);
    }
    let (Ok(a), Ok(b), Ok(year)) = (a.parse::<u32>(), b.parse::<u32>(), year.parse::<i32>()) else {
        return Err(FieldIssue::Unparseable);
    };
    let (month, day) = match (a <= 12, b <= 12) {
        (true, true) if a != b => {
            debug!(value = s, "ambiguous day/month order");
            return Err(FieldIssue::Ambiguous);
        }
        (true, _) => (a, b),
        (false, true) => (b, a),
        (false, false) => return Err(FieldIssue::Unparseable),
    };
    NaiveDate::from_ymd_opt(year, month, day).ok_or(FieldIssue::Unparseable)
}

/// Parse a time of day such as `22:00:06`
pub fn parse_time(raw: &str) -> Result<NaiveTime, FieldIssue> {
    let s = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
        .ok_or(FieldIssue::Unparseable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn strict_formats() {
        assert_eq!(parse_date("2005-10-23"), Ok(ymd(2005, 10, 23)));
        assert_eq!(parse_date("1968 October 16"), Ok(ymd(1968, 10, 16)));
        assert_eq!(parse_date("July 1961 14"), Ok(ymd(1961, 7, 14)));
        assert_eq!(parse_date("  2001-01-09 "), Ok(ymd(2001, 1, 9)));
    }

    #[test]
    fn permissive_formats() {
        assert_eq!(parse_date("2003/05/09"), Ok(ymd(2003, 5, 9)));
        assert_eq!(parse_date("12 March 1998"), Ok(ymd(1998, 3, 12)));
        assert_eq!(parse_date("March 12 1998"), Ok(ymd(1998, 3, 12)));
        assert_eq!(parse_date("2022-05-04 13:11:09"), Ok(ymd(2022, 5, 4)));
        assert_eq!(parse_date("2022-05-04T13:11:09+01:00"), Ok(ymd(2022, 5, 4)));
    }

    #[test]
    fn numeric_orders_only_when_unambiguous() {
        assert_eq!(parse_date("13/04/2010"), Ok(ymd(2010, 4, 13)));
        assert_eq!(parse_date("04/13/2010"), Ok(ymd(2010, 4, 13)));
        assert_eq!(parse_date("05/05/2010"), Ok(ymd(2010, 5, 5)));
        assert_eq!(parse_date("03/04/2010"), Err(FieldIssue::Ambiguous));
    }

    #[test]
    fn garbage_is_unparseable_not_a_panic() {
        for raw in ["", "GFJQ2AAEQ8", "2005-13-45", "31/31/2010", "NULL", "1/2/99"] {
            assert_eq!(parse_date(raw), Err(FieldIssue::Unparseable), "{raw}");
        }
    }

    #[test]
    fn times() {
        assert_eq!(parse_time("22:00:06"), Ok(NaiveTime::from_hms_opt(22, 0, 6).unwrap()));
        assert_eq!(parse_time("09:30"), Ok(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
        assert_eq!(parse_time("Evening"), Err(FieldIssue::Unparseable));
    }
}
