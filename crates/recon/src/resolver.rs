use std::collections::BTreeMap;

use crate::error::ReconError;
use crate::model::{
    DateAxis, DuplicateGroup, EntityDateKey, EntityMapping, Grouping, ResolutionChoice,
    ResolvedAmounts, SourceRecord,
};

/// Group records by (mapped entity, date).
///
/// Records are dropped when their source name maps to nothing (or to the
/// empty string), when their date or amount did not parse, or when their
/// date is not one of the template's dates. Keys with one amount pass
/// through as singles; keys with more become duplicate groups.
pub fn group(records: &[SourceRecord], mapping: &EntityMapping, date_axis: &DateAxis) -> Grouping {
    let mut groups: BTreeMap<EntityDateKey, Vec<f64>> = BTreeMap::new();

    for record in records {
        let Some(entity) = mapping.get(&record.raw_entity).map(|e| e.trim()) else {
            continue;
        };
        if entity.is_empty() {
            continue;
        }
        let (Some(date), Some(amount)) = (record.date, record.amount) else {
            continue;
        };
        if !date_axis.contains_date(date) {
            continue;
        }
        groups.entry(EntityDateKey::new(entity, date)).or_default().push(amount);
    }

    let mut grouping = Grouping::default();
    for (key, amounts) in groups {
        if amounts.len() > 1 {
            grouping.duplicates.push(DuplicateGroup { key, amounts });
        } else {
            grouping.singles.insert(key, amounts[0]);
        }
    }

    log::debug!(
        "grouped records into {} single and {} duplicate key(s)",
        grouping.singles.len(),
        grouping.duplicates.len()
    );
    grouping
}

/// Per-group duplicate choices. Groups without an entry resolve by sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolutions {
    choices: BTreeMap<EntityDateKey, ResolutionChoice>,
}

impl Resolutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choose(&mut self, key: EntityDateKey, choice: ResolutionChoice) {
        self.choices.insert(key, choice);
    }

    pub fn choice(&self, key: &EntityDateKey) -> ResolutionChoice {
        self.choices.get(key).copied().unwrap_or_default()
    }

    /// Bulk action: every listed group goes back to `Sum`, discarding any
    /// individual pick. Later `choose` calls still apply.
    pub fn select_sum_for_all(&mut self, groups: &[DuplicateGroup]) {
        for group in groups {
            self.choices.insert(group.key.clone(), ResolutionChoice::Sum);
        }
    }
}

/// Final amount per key: singles unchanged, duplicate groups per choice.
pub fn resolve(grouping: &Grouping, resolutions: &Resolutions) -> Result<ResolvedAmounts, ReconError> {
    let mut resolved = grouping.singles.clone();

    for group in &grouping.duplicates {
        let amount = match resolutions.choice(&group.key) {
            ResolutionChoice::Sum => group.sum(),
            ResolutionChoice::Pick(amount) => {
                if !group.amounts.iter().any(|a| *a == amount) {
                    return Err(ReconError::InvalidChoice {
                        entity: group.key.entity.clone(),
                        date: group.key.date,
                        amount,
                    });
                }
                amount
            }
        };
        resolved.insert(group.key.clone(), amount);
    }

    Ok(resolved)
}
