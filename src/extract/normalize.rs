//! Turning raw OCR text into canonical field values.
//!
//! All of these are total: every input produces a string, with a sentinel when
//! there is nothing usable.

use std::sync::LazyLock;

use chrono::Datelike as _;
use regex::Regex;

/// Sentinel for an order or operator number with no digits.
pub const UNKNOWN: &str = "UNKNOWN";

/// Sentinel for a date with no usable text.
pub const UNKNOWN_DATE: &str = "UNKNOWN_DATE";

/// Sentinel for every field when the extraction failed unexpectedly.
pub const ERROR: &str = "ERROR";

/// Is this value one of our placeholders rather than real data?
pub fn is_sentinel(value: &str) -> bool {
    matches!(value, UNKNOWN | UNKNOWN_DATE | ERROR)
}

/// Number of digits an order number is built from.
const ORDER_DIGITS: usize = 15;

/// Where each order segment starts and ends within the digit string.
///
/// These stop at 14, so the fifteenth digit is read but never printed. Stored
/// order numbers already have this shape, so we keep it.
const ORDER_SEGMENTS: [(usize, usize); 4] = [(0, 3), (3, 7), (7, 11), (11, 14)];

/// Source of the current year, for dates written without one.
pub trait Clock: Send + Sync + 'static {
    fn current_year(&self) -> i32;
}

/// The local system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_year(&self) -> i32 {
        chrono::Local::now().year()
    }
}

/// A clock stuck in one year.
#[cfg(test)]
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub i32);

#[cfg(test)]
impl Clock for FixedClock {
    fn current_year(&self) -> i32 {
        self.0
    }
}

/// Normalize an order number to `DDD-DDDD-DDDD-DDD`.
///
/// Non-digits are dropped, then the digits are cut or right-padded with `0` to
/// 15. Text without any digits becomes [`UNKNOWN`].
pub fn normalize_order(raw: &str) -> String {
    let mut digits = raw
        .chars()
        .filter(char::is_ascii_digit)
        .take(ORDER_DIGITS)
        .collect::<String>();
    if digits.is_empty() {
        return UNKNOWN.to_owned();
    }
    while digits.len() < ORDER_DIGITS {
        digits.push('0');
    }
    ORDER_SEGMENTS
        .iter()
        .map(|&(start, end)| &digits[start..end])
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalize an operator number: digits only, or [`UNKNOWN`].
pub fn normalize_operator(raw: &str) -> String {
    let digits = raw.chars().filter(char::is_ascii_digit).collect::<String>();
    if digits.is_empty() {
        UNKNOWN.to_owned()
    } else {
        digits
    }
}

/// `d.m.y` at the start of the cleaned text.
static DOT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,2})\.([0-9]{1,2})\.([0-9]{2,4})").expect("failed to compile regex")
});

/// `d-m-y` at the start of the cleaned text.
static DASH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,2})-([0-9]{1,2})-([0-9]{2,4})").expect("failed to compile regex")
});

/// Normalize a date to `dd.mm.yyyy`.
///
/// Dotted or dashed dates are zero-padded, with two-digit years placed in the
/// 2000s. Otherwise we read the digits as `ddmm[yy[yy]]`, taking the year from
/// `clock` when only day and month are present. With fewer than four digits
/// we give up and return the cleaned text, or [`UNKNOWN_DATE`] if that is
/// empty.
pub fn normalize_date(raw: &str, clock: &dyn Clock) -> String {
    let cleaned = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect::<String>();

    let captures = DOT_DATE
        .captures(&cleaned)
        .or_else(|| DASH_DATE.captures(&cleaned));
    if let Some(caps) = captures {
        let year = &caps[3];
        let year = if year.len() == 2 {
            format!("20{year}")
        } else {
            year.to_owned()
        };
        return format!("{:0>2}.{:0>2}.{}", &caps[1], &caps[2], year);
    }

    let digits = cleaned
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.len() < 4 {
        return if cleaned.is_empty() {
            UNKNOWN_DATE.to_owned()
        } else {
            cleaned
        };
    }

    let day = &digits[0..2];
    let month = &digits[2..4];
    let year = if digits.len() >= 8 {
        digits[4..8].to_owned()
    } else if digits.len() >= 6 {
        format!("20{}", &digits[4..6])
    } else {
        clock.current_year().to_string()
    };
    format!("{day}.{month}.{year}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_order_shaped(s: &str) -> bool {
        let parts = s.split('-').collect::<Vec<_>>();
        parts.iter().map(|p| p.len()).collect::<Vec<_>>() == [3, 4, 4, 3]
            && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
    }

    #[test]
    fn order_truncates_to_fifteen_digits() {
        assert_eq!(normalize_order("1234567890123456"), "123-4567-8901-234");
    }

    #[test]
    fn order_drops_the_fifteenth_digit() {
        // Digits 1-14 are printed, digit 15 (the `5`) is not.
        assert_eq!(normalize_order("123456789012345"), "123-4567-8901-234");
        assert_eq!(normalize_order("12345678901234"), "123-4567-8901-234");
    }

    #[test]
    fn order_pads_short_input() {
        assert_eq!(normalize_order("42"), "420-0000-0000-000");
        assert_eq!(normalize_order("No. 4-2"), "420-0000-0000-000");
    }

    #[test]
    fn order_without_digits_is_unknown() {
        assert_eq!(normalize_order("abc"), UNKNOWN);
        assert_eq!(normalize_order(""), UNKNOWN);
        // Non-ASCII digits are not order digits.
        assert_eq!(normalize_order("٣٤٥"), UNKNOWN);
    }

    #[test]
    fn order_is_always_unknown_or_pattern() {
        let inputs = [
            "",
            "x",
            "7",
            "12-3456-7890-123",
            "1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9",
            "…—ü0",
            "....----",
            "000000000000000000000000",
        ];
        for input in inputs {
            let out = normalize_order(input);
            assert!(
                out == UNKNOWN || is_order_shaped(&out),
                "{input:?} -> {out:?}"
            );
        }
    }

    #[test]
    fn operator_keeps_digits_only() {
        assert_eq!(normalize_operator(" 0 17\n"), "017");
        assert_eq!(normalize_operator("--"), UNKNOWN);
    }

    #[test]
    fn date_with_dots_and_short_year() {
        assert_eq!(normalize_date("05.03.24", &FixedClock(1999)), "05.03.2024");
    }

    #[test]
    fn date_with_dashes_is_padded() {
        assert_eq!(normalize_date("5-3-2024", &FixedClock(1999)), "05.03.2024");
    }

    #[test]
    fn date_ignores_noise_characters() {
        assert_eq!(
            normalize_date("Data: 1.12.2023 r.", &FixedClock(1999)),
            "01.12.2023"
        );
    }

    #[test]
    fn date_empty_is_unknown() {
        assert_eq!(normalize_date("", &FixedClock(1999)), UNKNOWN_DATE);
        assert_eq!(normalize_date("date", &FixedClock(1999)), UNKNOWN_DATE);
    }

    #[test]
    fn date_with_too_few_digits_returns_cleaned_text() {
        assert_eq!(normalize_date("1.2", &FixedClock(1999)), "1.2");
        assert_eq!(normalize_date("ab-7", &FixedClock(1999)), "-7");
    }

    #[test]
    fn date_from_bare_digits() {
        let clock = FixedClock(2031);
        assert_eq!(normalize_date("05032024", &clock), "05.03.2024");
        assert_eq!(normalize_date("050324", &clock), "05.03.2024");
        assert_eq!(normalize_date("0503", &clock), "05.03.2031");
        assert_eq!(normalize_date("05031", &clock), "05.03.2031");
    }

    #[test]
    fn date_with_mixed_separators_falls_back_to_digits() {
        assert_eq!(normalize_date("05.03-2024", &FixedClock(1999)), "05.03.2024");
    }

    #[test]
    fn sentinels_are_recognized() {
        assert!(is_sentinel(UNKNOWN));
        assert!(is_sentinel(UNKNOWN_DATE));
        assert!(is_sentinel(ERROR));
        assert!(!is_sentinel("420-0000-0000-000"));
    }
}
