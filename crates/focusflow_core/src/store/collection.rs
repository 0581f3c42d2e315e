//! One identifier-unique collection of records of a single kind.

use crate::model::record::{EntityKind, Record, RecordKey};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Collection {
    kind: EntityKind,
    records: BTreeMap<RecordKey, Record>,
}

impl Collection {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            records: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &RecordKey) -> Option<&mut Record> {
        self.records.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub(crate) fn insert(&mut self, record: Record) {
        self.records.insert(record.key.clone(), record);
    }

    pub(crate) fn remove(&mut self, key: &RecordKey) -> Option<Record> {
        self.records.remove(key)
    }

    pub(crate) fn replace_all(&mut self, records: Vec<Record>) {
        self.records = records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
    }
}
