//! Revisioned last-writer-wins slot.
//!
//! Each source owns one slot in the aggregate state. A value is only replaced
//! by a value carrying the same or a higher revision, so a slow reduction of
//! an older snapshot can never overwrite the result of a newer one.

/// A last-writer-wins register ordered by feed revision.
#[derive(Clone, Debug, PartialEq)]
pub struct Revisioned<T> {
    value: Option<T>,
    revision: u64,
}

impl<T> Revisioned<T> {
    /// An empty slot at revision 0.
    pub fn new() -> Self {
        Self {
            value: None,
            revision: 0,
        }
    }

    /// Store `value` if `revision` is not older than the current one.
    /// Returns whether the write was accepted.
    pub fn set(&mut self, value: T, revision: u64) -> bool {
        if revision >= self.revision {
            self.value = Some(value);
            self.revision = revision;
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl<T> Default for Revisioned<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revisioned_basic_operations() {
        let mut slot: Revisioned<i32> = Revisioned::new();

        assert!(slot.is_empty());
        assert_eq!(slot.get(), None);

        assert!(slot.set(42, 1));
        assert_eq!(slot.get(), Some(&42));
        assert_eq!(slot.revision(), 1);
    }

    #[test]
    fn test_revisioned_higher_revision_wins() {
        let mut slot: Revisioned<i32> = Revisioned::new();

        slot.set(10, 1);
        slot.set(20, 3);
        assert_eq!(slot.get(), Some(&20));

        // Late arrival from an older snapshot is dropped
        assert!(!slot.set(30, 2));
        assert_eq!(slot.get(), Some(&20));
        assert_eq!(slot.revision(), 3);
    }

    #[test]
    fn test_revisioned_same_revision_reapplies() {
        let mut slot: Revisioned<i32> = Revisioned::new();
        slot.set(7, 5);
        let before = slot.clone();

        assert!(slot.set(7, 5));
        assert_eq!(slot, before);
    }
}
