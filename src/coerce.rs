//! Value coercion helpers shared by the request validator and the result decoder.
//!
//! Every function here is total: unparsable input yields `None` (or the
//! zero-like value of the target type), never a panic or an error.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];

/// Normalizes a locale-formatted amount ("R$ 1.234,56", "12,5", "1234") into
/// text shaped like `-?\d+\.\d{2}`.
///
/// Inputs longer than three characters are treated as currency: everything but
/// digits, `.` and `,` is dropped, the last three characters are taken as the
/// fractional marker (comma becomes a period) and the remainder keeps only its
/// digits. Shorter inputs only lose currency symbols. The result is padded to
/// two fractional digits.
///
/// This heuristic is lossy: `"1234.567"` becomes `"1234567.00"` because the
/// last three characters carry no separator.
pub fn normalize_decimal(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let kept: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let mut value = if body.chars().count() > 3 {
        let split = kept.len().saturating_sub(3);
        let (int_part, frac_part) = kept.split_at(split);
        let int_part: String = int_part.chars().filter(char::is_ascii_digit).collect();
        format!("{}{}", int_part, frac_part.replace(',', "."))
    } else {
        kept.replace(',', ".")
    };

    if value.starts_with('.') {
        value.insert(0, '0');
    }

    match value.find('.') {
        None => value.push_str(".00"),
        Some(pos) => match value.len() - pos - 1 {
            0 => value.push_str("00"),
            1 => value.push('0'),
            _ => {}
        },
    }

    let (int_part, frac_part) = value.split_once('.')?;
    let well_formed = !int_part.is_empty()
        && int_part.chars().all(|c| c.is_ascii_digit())
        && frac_part.len() == 2
        && frac_part.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return None;
    }

    if negative {
        value.insert(0, '-');
    }
    Some(value)
}

/// Best-effort parse of a freeform date/time string, relative to the local clock.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    parse_datetime_at(raw, Local::now().naive_local())
}

/// Best-effort parse of a freeform date/time string, resolving relative words
/// ("now", "today", "tomorrow", "yesterday") and bare times against `now`.
pub fn parse_datetime_at(raw: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0);
    match text.to_ascii_lowercase().as_str() {
        "now" => return Some(now),
        "today" | "midnight" => return midnight(now.date()),
        "tomorrow" => return midnight(now.date() + Duration::days(1)),
        "yesterday" => return midnight(now.date() - Duration::days(1)),
        _ => {}
    }

    if let Some(seconds) = text.strip_prefix('@') {
        return seconds
            .parse::<i64>()
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .map(|dt| dt.naive_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }

    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(dt);
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    {
        return midnight(date);
    }

    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
        .map(|time| now.date().and_time(time))
}

/// `YYYY-MM-DD HH:MM:SS`, or `None` when the input cannot be parsed.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    parse_datetime(raw).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// `YYYY-MM-DD`, or `None` when the input cannot be parsed.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_datetime(raw).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// `HH:MM:SS`, or `None` when the input cannot be parsed.
pub fn normalize_time(raw: &str) -> Option<String> {
    parse_datetime(raw).map(|dt| dt.format("%H:%M:%S").to_string())
}

/// Accepted boolean tokens, case-insensitive.
pub fn parse_bool_token(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "s" | "y" => Some(true),
        "false" | "0" | "n" => Some(false),
        _ => None,
    }
}

/// Numeric text: optional sign, digits with an optional fraction, optional exponent.
pub fn is_numeric(raw: &str) -> bool {
    let text = raw.trim();
    !text.is_empty()
        && text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        && text.parse::<f64>().is_ok()
}

/// Integer value of the leading numeric prefix; `0` when there is none.
pub fn leading_int(raw: &str) -> i64 {
    let text = raw.trim_start();
    let (negative, digits_start) = match text.as_bytes().first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };
    let digits: String = text[digits_start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return 0;
    }
    match digits.parse::<i64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    }
}

/// Float value of the longest parsable numeric prefix; `0.0` when there is none.
pub fn leading_float(raw: &str) -> f64 {
    let candidate: String = raw
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        .collect();
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .filter(|f| f.is_finite())
        .unwrap_or(0.0)
}

/// Structural e-mail check: a dot-atom local part and a multi-label host name.
pub fn is_email(raw: &str) -> bool {
    const LOCAL_SPECIALS: &str = "!#$%&'*+/=?^_`{|}~-.";

    let Some((local, domain)) = raw.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.len() > 253 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || LOCAL_SPECIALS.contains(c))
    {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
