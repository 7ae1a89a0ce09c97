//! Selection state store
//!
//! Holds the in-progress choice for each negotiable item, keyed by entry id.
//! Entries are only ever inserted or overwritten; items without options never
//! get an entry and count as satisfied.

use std::collections::{BTreeMap, HashMap};

use crate::error::WorkflowError;
use crate::models::{InteractiveItem, SelectionState, SubmissionEntry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionStore {
    selections: HashMap<String, SelectionState>,
    /// Option count per known item, used to clamp incoming indices
    option_counts: HashMap<String, usize>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `items` and write each item's initial choice.
    pub fn seed_defaults(&mut self, items: &[InteractiveItem]) {
        for item in items {
            self.option_counts
                .insert(item.id.clone(), item.options.len());

            if !item.requires_selection() {
                continue;
            }
            let index = item.clamp_index(item.initial_selection_index);
            let label = item.label_at(index).unwrap_or_default().to_string();
            self.selections
                .insert(item.id.clone(), SelectionState { index, label });
        }
    }

    /// Insert or overwrite a choice; the index is clamped to the item's options.
    pub fn set(&mut self, item_id: &str, index: usize, label: &str) -> Result<&SelectionState, WorkflowError> {
        let count = *self
            .option_counts
            .get(item_id)
            .ok_or_else(|| WorkflowError::Validation(format!("Unknown item '{}'", item_id)))?;
        if count == 0 {
            return Err(WorkflowError::Validation(format!(
                "Item '{}' has no options to choose from",
                item_id
            )));
        }

        let state = SelectionState {
            index: index.min(count - 1),
            label: label.to_string(),
        };
        self.selections.insert(item_id.to_string(), state);
        Ok(&self.selections[item_id])
    }

    pub fn get(&self, item_id: &str) -> Option<&SelectionState> {
        self.selections.get(item_id)
    }

    /// True iff every item with at least one option has a selection.
    pub fn is_complete(&self, items: &[InteractiveItem]) -> bool {
        items
            .iter()
            .filter(|item| item.requires_selection())
            .all(|item| self.selections.contains_key(&item.id))
    }

    /// Ids of items that still need a choice
    pub fn missing<'a>(&self, items: &'a [InteractiveItem]) -> Vec<&'a str> {
        items
            .iter()
            .filter(|item| item.requires_selection() && !self.selections.contains_key(&item.id))
            .map(|item| item.id.as_str())
            .collect()
    }

    /// Calculate completion percentage (0-100); 100 when nothing needs a choice
    pub fn completion_percentage(&self, items: &[InteractiveItem]) -> u8 {
        let required = items.iter().filter(|i| i.requires_selection()).count();
        if required == 0 {
            return 100;
        }
        let chosen = required - self.missing(items).len();
        ((chosen as f32 / required as f32) * 100.0) as u8
    }

    /// Label to submit for `item`: option text at the stored index, or the
    /// stored label if the index no longer lines up.
    fn resolved_label(item: &InteractiveItem, state: &SelectionState) -> String {
        item.label_at(state.index)
            .map(str::to_string)
            .unwrap_or_else(|| state.label.clone())
    }

    /// Submission entries in item order; items without a selection are skipped.
    pub fn to_submission_payload(&self, items: &[InteractiveItem]) -> Vec<SubmissionEntry> {
        items
            .iter()
            .filter_map(|item| {
                self.selections.get(&item.id).map(|state| SubmissionEntry {
                    entry_id: item.id.clone(),
                    transport_vendor: Self::resolved_label(item, state),
                })
            })
            .collect()
    }

    /// The keyed map expected by `apply`
    pub fn to_selection_map(&self, items: &[InteractiveItem]) -> BTreeMap<String, String> {
        self.to_submission_payload(items)
            .into_iter()
            .map(|entry| (entry.entry_id, entry.transport_vendor))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Drop all selections and known items
    pub fn clear(&mut self) {
        self.selections.clear();
        self.option_counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateRow, VendorCode};

    fn item(id: &str, options: &[&str], initial: usize) -> InteractiveItem {
        InteractiveItem::from_row(CandidateRow {
            entry_id: id.to_string(),
            vendor_code: VendorCode::Number(1),
            vendor_name: "仕入先".to_string(),
            item_name: "商品".to_string(),
            detail: None,
            options: options.iter().map(|s| s.to_string()).collect(),
            initial_index: initial,
        })
    }

    #[test]
    fn test_seed_defaults_skips_optionless_items() {
        let items = vec![item("1", &["A", "B"], 1), item("2", &[], 0)];
        let mut store = SelectionStore::new();
        store.seed_defaults(&items);

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("1"),
            Some(&SelectionState {
                index: 1,
                label: "B".to_string()
            })
        );
        assert!(store.get("2").is_none());
        assert!(store.is_complete(&items));
    }

    #[test]
    fn test_completeness_requires_every_item_with_options() {
        let items = vec![item("1", &["A"], 0), item("2", &["B", "C"], 0)];
        let mut store = SelectionStore::new();
        assert!(!store.is_complete(&items));
        assert_eq!(store.missing(&items), vec!["1", "2"]);
        assert_eq!(store.completion_percentage(&items), 0);

        store.seed_defaults(&items[..1]);
        // Item 2 is unknown to the store until seeded
        assert!(store.set("2", 0, "B").is_err());
        assert!(!store.is_complete(&items));
        assert_eq!(store.completion_percentage(&items), 50);

        store.seed_defaults(&items);
        assert!(store.is_complete(&items));
        assert!(store.missing(&items).is_empty());
    }

    #[test]
    fn test_empty_item_set_is_trivially_complete() {
        let store = SelectionStore::new();
        assert!(store.is_complete(&[]));
        assert!(store.to_submission_payload(&[]).is_empty());
        assert_eq!(store.completion_percentage(&[]), 100);
    }

    #[test]
    fn test_set_clamps_and_overwrites() {
        let items = vec![item("1", &["A", "B", "C"], 0)];
        let mut store = SelectionStore::new();
        store.seed_defaults(&items);

        let state = store.set("1", 10, "C").unwrap();
        assert_eq!(state.index, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_rejects_optionless_item() {
        let items = vec![item("1", &[], 0)];
        let mut store = SelectionStore::new();
        store.seed_defaults(&items);
        assert!(matches!(
            store.set("1", 0, "x"),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_payload_resolves_label_by_index_with_fallback() {
        let items = vec![item("1", &["A", "B"], 0), item("2", &["X"], 0), item("3", &[], 0)];
        let mut store = SelectionStore::new();
        store.seed_defaults(&items);
        store.set("1", 1, "stale text").unwrap();

        let payload = store.to_submission_payload(&items);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[0].entry_id, "1");
        assert_eq!(payload[0].transport_vendor, "B");

        // Same id, fewer options than when the choice was stored
        let shrunk = vec![item("1", &["A"], 0)];
        let mut out_of_sync = SelectionStore::new();
        out_of_sync.seed_defaults(&items);
        out_of_sync.set("1", 1, "B").unwrap();
        let payload = out_of_sync.to_submission_payload(&shrunk);
        assert_eq!(payload[0].transport_vendor, "B");
    }

    #[test]
    fn test_selection_map_is_keyed_by_entry_id() {
        let items = vec![item("10", &["オネスト"], 0), item("11", &["佐川", "ヤマト"], 1)];
        let mut store = SelectionStore::new();
        store.seed_defaults(&items);
        let map = store.to_selection_map(&items);
        assert_eq!(map.get("10").map(String::as_str), Some("オネスト"));
        assert_eq!(map.get("11").map(String::as_str), Some("ヤマト"));
    }

    #[test]
    fn test_clear() {
        let items = vec![item("1", &["A"], 0)];
        let mut store = SelectionStore::new();
        store.seed_defaults(&items);
        store.clear();
        assert!(store.is_empty());
        assert!(store.set("1", 0, "A").is_err());
    }
}
