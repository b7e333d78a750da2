//! Snapshot diff
//!
//! Pure set difference between what a bridge imported so far and the
//! external catalog's current content. Keys are external keys.

use std::collections::{BTreeMap, HashMap};

use crate::model::Record;

/// What a bridge remembers about one imported entry
#[derive(Clone, Debug, PartialEq)]
pub struct Imported {
    pub registration: String,
    /// Translated record as last written, without registration id
    pub record: Record,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiffPlan {
    pub arrivals: Vec<(String, Record)>,
    /// `(key, registration, new content)`
    pub updates: Vec<(String, String, Record)>,
    /// `(key, registration)`
    pub departures: Vec<(String, String)>,
    pub unchanged: usize,
}

impl DiffPlan {
    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty() && self.updates.is_empty() && self.departures.is_empty()
    }
}

/// Compute the changes that bring `known` in line with `current`.
///
/// Output order is by key within each category.
pub fn diff(known: &HashMap<String, Imported>, current: &BTreeMap<String, Record>) -> DiffPlan {
    let mut plan = DiffPlan::default();

    for (key, record) in current {
        match known.get(key) {
            None => plan.arrivals.push((key.clone(), record.clone())),
            Some(imported) if !imported.record.same_content(record) => plan.updates.push((
                key.clone(),
                imported.registration.clone(),
                record.clone(),
            )),
            Some(_) => plan.unchanged += 1,
        }
    }

    let mut departures: Vec<(String, String)> = known
        .iter()
        .filter(|(key, _)| !current.contains_key(*key))
        .map(|(key, imported)| (key.clone(), imported.registration.clone()))
        .collect();
    departures.sort();
    plan.departures = departures;

    plan
}
