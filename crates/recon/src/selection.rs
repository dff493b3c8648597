use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::config::ExtendConfig;

/// Which candidate dates the user wants appended: an optional explicit
/// multi-select, narrowed by an optional inclusive range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateSelection {
    pub dates: Option<BTreeSet<NaiveDate>>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateSelection {
    /// Everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ExtendConfig) -> Self {
        Self {
            dates: config.dates.as_ref().map(|d| d.iter().copied().collect()),
            from: config.from,
            to: config.to,
        }
    }

    pub fn accepts(&self, date: NaiveDate) -> bool {
        if let Some(ref picked) = self.dates {
            if !picked.contains(&date) {
                return false;
            }
        }
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// Sorted, deduplicated candidates that pass the selection.
pub fn select_dates(candidates: impl IntoIterator<Item = NaiveDate>, selection: &DateSelection) -> Vec<NaiveDate> {
    let unique: BTreeSet<NaiveDate> = candidates.into_iter().collect();
    unique.into_iter().filter(|d| selection.accepts(*d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn default_selects_everything_once_sorted() {
        let picked = select_dates(vec![d(3, 31), d(1, 15), d(3, 31), d(2, 29)], &DateSelection::all());
        assert_eq!(picked, vec![d(1, 15), d(2, 29), d(3, 31)]);
    }

    #[test]
    fn range_is_inclusive() {
        let sel = DateSelection { from: Some(d(2, 29)), to: Some(d(3, 31)), ..Default::default() };
        let picked = select_dates(vec![d(1, 15), d(2, 29), d(3, 31), d(4, 30)], &sel);
        assert_eq!(picked, vec![d(2, 29), d(3, 31)]);
    }

    #[test]
    fn multi_select_and_range_combine() {
        let sel = DateSelection {
            dates: Some([d(1, 15), d(4, 30)].into_iter().collect()),
            from: Some(d(2, 1)),
            to: None,
        };
        let picked = select_dates(vec![d(1, 15), d(2, 29), d(4, 30)], &sel);
        assert_eq!(picked, vec![d(4, 30)]);
    }

    #[test]
    fn cleared_selection_picks_nothing() {
        let sel = DateSelection { dates: Some(BTreeSet::new()), ..Default::default() };
        assert!(select_dates(vec![d(1, 15)], &sel).is_empty());
    }
}
