//! Lenient date parsing for cells coming out of arbitrary spreadsheets.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::grid::CellValue;

// Two-digit years come first: `%Y` would happily read "24" as year 24.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d-%b-%y",
    "%d-%b-%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Largest serial Excel accepts (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

fn excel_epoch() -> NaiveDate {
    // 1899-12-30 absorbs the 1900 leap-year bug for every serial >= 61.
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Parse a date out of a cell: date cells as-is, numbers as Excel serials,
/// text in the common US / ISO / long-form spellings.
pub fn parse_date_cell(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::Number(n) => serial_to_date(*n),
        CellValue::Text(s) => parse_date_text(s),
        CellValue::Empty | CellValue::Formula(_) => None,
    }
}

pub fn parse_date_text(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    excel_epoch().checked_add_signed(Duration::days(serial.floor() as i64))
}

pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date - excel_epoch()).num_days() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn text_formats() {
        let want = ymd(2024, 1, 15);
        for s in [
            "2024-01-15",
            "2024/01/15",
            "1/15/2024",
            "01/15/24",
            "15 January 2024",
            "15 Jan 2024",
            "January 15, 2024",
            "Jan 15, 2024",
            "15-Jan-2024",
            "2024-01-15 00:00:00",
            "2024-01-15T13:45:00",
            "  2024-01-15  ",
        ] {
            assert_eq!(parse_date_text(s), Some(want), "{s}");
        }
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date_text(""), None);
        assert_eq!(parse_date_text("TBD"), None);
        assert_eq!(parse_date_text("2024-13-45"), None);
        assert_eq!(parse_date_cell(&CellValue::Empty), None);
        assert_eq!(parse_date_cell(&CellValue::Formula("=TODAY()".into())), None);
    }

    #[test]
    fn excel_serials() {
        assert_eq!(serial_to_date(45306.0), Some(ymd(2024, 1, 15)));
        assert_eq!(serial_to_date(45306.75), Some(ymd(2024, 1, 15)));
        assert_eq!(date_to_serial(ymd(2024, 1, 15)), 45306.0);
        assert_eq!(date_to_serial(ymd(2040, 1, 1)), 51136.0);
        assert_eq!(serial_to_date(0.0), None);
        assert_eq!(serial_to_date(f64::NAN), None);
    }

    #[test]
    fn date_cells_pass_through() {
        let d = ymd(2023, 12, 31);
        assert_eq!(parse_date_cell(&CellValue::Date(d)), Some(d));
        assert_eq!(parse_date_cell(&CellValue::Number(45291.0)), Some(d));
    }
}
