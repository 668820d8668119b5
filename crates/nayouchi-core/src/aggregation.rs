//! Aggregation utilities
//!
//! Pure functions over in-memory collections that drive what participants see:
//! key projections, occurrence tallies, field plucking and the "shared names"
//! view. Mappings are `IndexMap`s so iteration order is insertion order, which
//! for a tally is the order in which values were first seen.

use core::hash::Hash;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{Member, Name, Role};

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

/// A name proposed by a specific member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nomination {
    pub name: Name,
    pub member: String,
}

impl Nomination {
    pub fn new<N: Into<Name>, M: Into<String>>(name: N, member: M) -> Self {
        Self {
            name: name.into(),
            member: member.into(),
        }
    }
}

/// Single-field record produced by [`duplicates`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameRecord {
    pub name: Name,
}

/// One entry of [`as_key_value_list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue<K, V> {
    pub key: K,
    pub value: V,
}

/// Which members take part in a duplicate computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateScope {
    /// Every member's nominations count
    #[default]
    AllMembers,
    /// Only the decision body's nominations count
    InitiatorsOnly,
}

impl DuplicateScope {
    fn includes(self, role: Role) -> bool {
        match self {
            DuplicateScope::AllMembers => true,
            DuplicateScope::InitiatorsOnly => role == Role::Initiator,
        }
    }
}

// ----------------------------------------------------------------------------
// Utilities
// ----------------------------------------------------------------------------

/// Key set of a mapping, in the mapping's iteration order
pub fn project_keys<K: Clone, V>(record: &IndexMap<K, V>) -> Vec<K> {
    record.keys().cloned().collect()
}

/// Occurrence count per distinct value; absent keys mean zero occurrences
pub fn tally<T, I>(values: I) -> IndexMap<T, usize>
where
    T: Hash + Eq,
    I: IntoIterator<Item = T>,
{
    let mut counts = IndexMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
}

/// Project one field out of every record, preserving length and order
pub fn pluck<R, T, F>(records: &[R], field: F) -> Vec<T>
where
    F: Fn(&R) -> T,
{
    records.iter().map(field).collect()
}

/// Names occurring more than once across all records
///
/// Output order follows first occurrence in the input; callers must not rely
/// on it, only on membership.
pub fn duplicates(records: &[Nomination]) -> Vec<NameRecord> {
    let counts = tally(pluck(records, |record| record.name.clone()));
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| NameRecord { name })
        .collect()
}

/// Mapping as an ordered list of key/value pairs
pub fn as_key_value_list<K: Clone, V: Clone>(mapping: &IndexMap<K, V>) -> Vec<KeyValue<K, V>> {
    mapping
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

pub fn contains<T: PartialEq>(values: &[T], value: &T) -> bool {
    values.iter().any(|v| v == value)
}

/// Names nominated by more than one member within `scope`
///
/// Each member's nominations are deduplicated first so a member repeating a
/// name never produces a match on their own.
pub fn duplicates_among(members: &[Member], scope: DuplicateScope) -> Vec<NameRecord> {
    let mut nominations = Vec::new();
    for member in members.iter().filter(|m| scope.includes(m.role)) {
        let mut seen: Vec<&Name> = Vec::new();
        for name in &member.nominations {
            if !contains(&seen, &name) {
                seen.push(name);
                nominations.push(Nomination::new(name.clone(), member.name.clone()));
            }
        }
    }
    duplicates(&nominations)
}

/// Nomination count per member name, in member order
pub fn nominations_per_member(nominations: &[Nomination]) -> IndexMap<String, usize> {
    tally(pluck(nominations, |n| n.member.clone()))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
