//! Deduplicated, insertion-ordered set of discovered peripherals.

use std::collections::HashMap;

use hygrolink_types::PeripheralHandle;

/// Peripherals seen during the current scan window.
///
/// Entries are unique by identifier and kept in first-seen order. The set
/// only grows while a scan runs; [`reset`](Self::reset) is the one way to
/// empty it.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySet {
    entries: Vec<PeripheralHandle>,
    index: HashMap<String, usize>,
}

impl DiscoverySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Record an observation, returning whether a new entry was appended.
    ///
    /// A repeat observation never reorders the set. If the earlier
    /// observation carried no name and this one does, the name is filled in.
    pub fn observe(&mut self, handle: PeripheralHandle) -> bool {
        if let Some(&pos) = self.index.get(&handle.id) {
            let existing = &mut self.entries[pos];
            if existing.name.is_none() && handle.name.is_some() {
                existing.name = handle.name;
            }
            return false;
        }
        self.index.insert(handle.id.clone(), self.entries.len());
        self.entries.push(handle);
        true
    }

    /// Snapshot of the entries in first-seen order.
    pub fn list(&self) -> Vec<PeripheralHandle> {
        self.entries.clone()
    }

    /// Borrow the entries in first-seen order.
    pub fn as_slice(&self) -> &[PeripheralHandle] {
        &self.entries
    }

    /// Entries that advertise a name.
    pub fn named(&self) -> impl Iterator<Item = &PeripheralHandle> {
        self.entries.iter().filter(|h| h.name.is_some())
    }

    /// Whether an entry with this identifier is present.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Look up an entry by exact identifier.
    pub fn get(&self, id: &str) -> Option<&PeripheralHandle> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    /// Find the first entry matching an identifier or name query.
    ///
    /// See [`PeripheralHandle::matches`] for the matching rules.
    pub fn find(&self, query: &str) -> Option<&PeripheralHandle> {
        self.get(query)
            .or_else(|| self.entries.iter().find(|h| h.matches(query)))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(set: &DiscoverySet) -> Vec<&str> {
        set.as_slice().iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_observe_deduplicates_by_identifier() {
        let mut set = DiscoverySet::new();
        assert!(set.observe(PeripheralHandle::new("A")));
        assert!(!set.observe(PeripheralHandle::new("A")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_first_seen_order() {
        let mut set = DiscoverySet::new();
        for id in ["C", "A", "B", "A", "C"] {
            set.observe(PeripheralHandle::new(id));
        }
        assert_eq!(ids(&set), ["C", "A", "B"]);
        assert_eq!(set.list().len(), 3);
    }

    #[test]
    fn test_name_does_not_affect_identity() {
        let mut set = DiscoverySet::new();
        assert!(set.observe(PeripheralHandle::with_name("A", "Kitchen")));
        assert!(!set.observe(PeripheralHandle::with_name("A", "Attic")));
        assert_eq!(set.get("A").and_then(|h| h.name.as_deref()), Some("Kitchen"));
    }

    #[test]
    fn test_repeat_observation_fills_missing_name() {
        let mut set = DiscoverySet::new();
        set.observe(PeripheralHandle::new("A"));
        set.observe(PeripheralHandle::new("B"));
        assert!(!set.observe(PeripheralHandle::with_name("A", "Kitchen")));
        assert_eq!(ids(&set), ["A", "B"]);
        assert_eq!(set.get("A").and_then(|h| h.name.as_deref()), Some("Kitchen"));
    }

    #[test]
    fn test_reset_empties_set() {
        let mut set = DiscoverySet::new();
        set.observe(PeripheralHandle::new("A"));
        set.observe(PeripheralHandle::new("B"));
        set.reset();
        assert!(set.is_empty());
        assert!(!set.contains("A"));
        assert!(set.observe(PeripheralHandle::new("A")));
    }

    #[test]
    fn test_named_view() {
        let mut set = DiscoverySet::new();
        set.observe(PeripheralHandle::new("A"));
        set.observe(PeripheralHandle::with_name("B", "Porch"));
        let named: Vec<_> = set.named().map(|h| h.id.as_str()).collect();
        assert_eq!(named, ["B"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_find_by_name_or_id() {
        let mut set = DiscoverySet::new();
        set.observe(PeripheralHandle::with_name("AA:BB:CC:DD:EE:FF", "Porch"));
        assert!(set.find("porch").is_some());
        assert!(set.find("aabbccddeeff").is_some());
        assert!(set.find("cellar").is_none());
    }
}
