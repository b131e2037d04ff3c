// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::sync::Arc;

use tracing::debug;

use crate::{EntityRecord, RecordId};

/// Rows of the page currently on screen.
///
/// Between page fetches the collection only changes through `replace`,
/// `remove`, and `insert`, all keyed by `_id`. Rows that an operation does
/// not target keep their order and their `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RowCollection {
    rows: Vec<Arc<EntityRecord>>,
}

impl RowCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        Self {
            rows: records.into_iter().map(Arc::new).collect(),
        }
    }

    /// Wholesale swap after a page fetch.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = EntityRecord>) {
        self.rows = records.into_iter().map(Arc::new).collect();
    }

    pub fn replace(&mut self, id: &RecordId, record: EntityRecord) -> bool {
        let Some(index) = self.position(id) else {
            debug!(%id, "replace target not on this page");
            return false;
        };
        self.rows[index] = Arc::new(record);
        true
    }

    pub fn remove(&mut self, id: &RecordId) -> bool {
        let Some(index) = self.position(id) else {
            debug!(%id, "remove target not on this page");
            return false;
        };
        self.rows.remove(index);
        true
    }

    /// Prepends. A record whose `_id` is already present replaces that row
    /// instead, so a create that lands after a refresh never duplicates.
    /// Returns `true` when a new row was added.
    pub fn insert(&mut self, record: EntityRecord) -> bool {
        if let Some(id) = record.id()
            && let Some(index) = self.position(&id)
        {
            self.rows[index] = Arc::new(record);
            return false;
        }
        self.rows.insert(0, Arc::new(record));
        true
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.id().as_ref() == Some(id))
    }

    pub fn find(&self, id: &RecordId) -> Option<&Arc<EntityRecord>> {
        self.position(id).map(|index| &self.rows[index])
    }

    pub fn get(&self, index: usize) -> Option<&Arc<EntityRecord>> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[Arc<EntityRecord>] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityRecord>> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::RowCollection;
    use crate::{EntityRecord, RecordId};
    use serde_json::json;
    use std::sync::Arc;

    fn role(id: &str, name: &str) -> EntityRecord {
        EntityRecord::new().with("_id", id).with("name", name)
    }

    fn sample() -> RowCollection {
        RowCollection::from_records([role("a", "A"), role("b", "B"), role("c", "C")])
    }

    fn ids(rows: &RowCollection) -> Vec<String> {
        rows.iter()
            .filter_map(|row| row.id())
            .map(|id| id.to_string())
            .collect()
    }

    #[test]
    fn replace_absent_id_leaves_every_row_untouched() {
        let mut rows = sample();
        let before: Vec<_> = rows.rows().to_vec();

        assert!(!rows.replace(&RecordId::from("zzz"), role("zzz", "Z")));

        assert_eq!(rows.len(), before.len());
        for (old, new) in before.iter().zip(rows.iter()) {
            assert!(Arc::ptr_eq(old, new));
        }
    }

    #[test]
    fn replace_present_id_keeps_position() {
        let mut rows = sample();
        let first = Arc::clone(&rows.rows()[0]);
        let last = Arc::clone(&rows.rows()[2]);

        assert!(rows.replace(&RecordId::from("b"), role("b", "Bee")));

        assert_eq!(ids(&rows), vec!["a", "b", "c"]);
        assert_eq!(rows.rows()[1].get("name"), Some(&json!("Bee")));
        assert!(Arc::ptr_eq(&first, &rows.rows()[0]));
        assert!(Arc::ptr_eq(&last, &rows.rows()[2]));
    }

    #[test]
    fn remove_shrinks_by_one_only_when_present() {
        let mut rows = sample();
        assert!(rows.remove(&RecordId::from("a")));
        assert_eq!(ids(&rows), vec!["b", "c"]);

        assert!(!rows.remove(&RecordId::from("a")));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn insert_prepends_new_rows() {
        let mut rows = sample();
        assert!(rows.insert(role("d", "D")));
        assert_eq!(ids(&rows), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn insert_with_existing_id_replaces_in_place() {
        let mut rows = sample();
        assert!(!rows.insert(role("c", "Sea")));
        assert_eq!(ids(&rows), vec!["a", "b", "c"]);
        assert_eq!(rows.rows()[2].get("name"), Some(&json!("Sea")));
    }

    #[test]
    fn out_of_order_updates_converge_by_id() {
        let mut left = sample();
        let mut right = sample();

        left.replace(&RecordId::from("a"), role("a", "A2"));
        left.remove(&RecordId::from("c"));
        right.remove(&RecordId::from("c"));
        right.replace(&RecordId::from("a"), role("a", "A2"));

        assert_eq!(ids(&left), ids(&right));
        assert_eq!(left.rows()[0].get("name"), right.rows()[0].get("name"));
    }
}
