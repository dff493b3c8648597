//! Placeholder padding for the incomplete flow.
//!
//! The downstream platform only imports roughly the first 56% of the
//! distribution periods in a file. Until that is understood, every batch of
//! N real dates is padded with placeholder periods so the total reaches
//! `ceil(N / 0.56)`. The ratio and the placeholder date are an external
//! business rule: keep them exactly as they are.

use chrono::NaiveDate;

/// Share of periods the downstream import is observed to accept.
pub const QUOTA_RATIO: f64 = 0.56;

/// Date given to every placeholder period (1 January 2040).
pub fn placeholder_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2040, 1, 1).unwrap_or(NaiveDate::MAX)
}

/// Number of placeholder periods to add for `real` genuine dates.
pub fn quota_padding(real: usize) -> usize {
    let required = (real as f64 / QUOTA_RATIO).ceil() as usize;
    required.saturating_sub(real)
}

/// Append the placeholder periods required for `dates` (already sorted).
pub fn pad_with_placeholders(dates: &mut Vec<NaiveDate>) -> usize {
    let extra = quota_padding(dates.len());
    if extra > 0 {
        log::info!(
            "adding {extra} placeholder period(s) dated {} for the import quota",
            placeholder_date().format("%d %b %Y")
        );
        dates.extend(std::iter::repeat(placeholder_date()).take(extra));
    }
    extra
}
