//! A single named payload inside a container

use crate::detect::EntryKind;

/// Payload residency of an [`Entry`].
///
/// `Released` is distinct from `NotLoaded`: it records that the payload was
/// materialized once (long enough for type detection) and then discarded, so
/// a later access still needs a lazy refetch from the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// Never materialized since the entry was created.
    NotLoaded,
    /// Payload bytes are resident in memory.
    Resident,
    /// Fetched once, then dropped; `source_offset` remains valid for a
    /// refetch.
    Released,
}

/// One logical file inside a container.
///
/// Entries are owned exclusively by the directory node they are attached to;
/// an entry does not exist outside a tree.
#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    size: usize,
    data: Vec<u8>,
    residency: Residency,
    source_offset: Option<u64>,
    kind: EntryKind,
    modified: bool,
}

impl Entry {
    /// Create an entry with a declared payload size and no resident data.
    ///
    /// Fresh entries start out modified; codecs reset the flag after a
    /// successful open or write-with-update.
    #[must_use]
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            data: Vec::new(),
            residency: Residency::NotLoaded,
            source_offset: None,
            kind: EntryKind::Unknown,
            modified: true,
        }
    }

    /// Leaf name, case-preserved.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the entry. Marks it modified.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.modified = true;
    }

    /// Declared payload length in bytes.
    ///
    /// Valid even while the payload itself is not resident.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// The payload bytes, or `None` when not resident.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match self.residency {
            Residency::Resident => Some(&self.data),
            Residency::NotLoaded | Residency::Released => None,
        }
    }

    /// Replace the payload with caller-supplied bytes.
    ///
    /// Updates the declared size, makes the payload resident, and marks the
    /// entry modified.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.size = data.len();
        self.data = data;
        self.residency = Residency::Resident;
        self.modified = true;
    }

    /// Materialize the payload from the backing container without marking
    /// the entry modified. The declared size is left untouched.
    pub(crate) fn materialize(&mut self, data: Vec<u8>) {
        self.data = data;
        self.residency = Residency::Resident;
    }

    /// Mark a zero-size or already-satisfied load as resident.
    pub(crate) fn mark_resident(&mut self) {
        self.residency = Residency::Resident;
    }

    /// Drop the resident payload, keeping the declared size.
    ///
    /// A later access refetches from the backing store via the recorded
    /// source offset. No-op unless the payload is resident.
    pub fn release(&mut self) {
        if self.residency == Residency::Resident {
            self.data = Vec::new();
            self.residency = Residency::Released;
        }
    }

    /// True if the payload bytes are in memory.
    #[must_use]
    pub fn is_resident(&self) -> bool {
        self.residency == Residency::Resident
    }

    /// Current residency state.
    #[must_use]
    pub fn residency(&self) -> Residency {
        self.residency
    }

    /// Byte offset of the payload in the backing store, when known.
    ///
    /// Format-specific metadata: recorded by the codec at open, rewritten
    /// during a write with offset updates, and consumed by the lazy-load
    /// path.
    #[must_use]
    pub fn source_offset(&self) -> Option<u64> {
        self.source_offset
    }

    pub(crate) fn set_source_offset(&mut self, offset: Option<u64>) {
        self.source_offset = offset;
    }

    /// Detected content type.
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Record the detected content type.
    pub fn set_kind(&mut self, kind: EntryKind) {
        self.kind = kind;
    }

    /// Dirty flag: true when the entry changed since open/save.
    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified
    }

    /// Set or clear the dirty flag.
    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_unloaded_and_modified() {
        let entry = Entry::new("palette.lmp", 768);
        assert_eq!(entry.residency(), Residency::NotLoaded);
        assert_eq!(entry.size(), 768);
        assert!(entry.data().is_none());
        assert!(entry.modified());
    }

    #[test]
    fn set_data_updates_size_and_marks_modified() {
        let mut entry = Entry::new("readme.txt", 0);
        entry.set_modified(false);
        entry.set_data(b"hello".to_vec());
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.data(), Some(&b"hello"[..]));
        assert!(entry.modified());
    }

    #[test]
    fn materialize_keeps_declared_size_and_dirty_flag() {
        let mut entry = Entry::new("e1m1.bsp", 4);
        entry.set_modified(false);
        entry.materialize(vec![1, 2, 3, 4]);
        assert!(entry.is_resident());
        assert_eq!(entry.size(), 4);
        assert!(!entry.modified());
    }

    #[test]
    fn release_requires_a_refetch() {
        let mut entry = Entry::new("e1m1.bsp", 4);
        entry.materialize(vec![1, 2, 3, 4]);
        entry.release();
        assert_eq!(entry.residency(), Residency::Released);
        assert!(entry.data().is_none());

        // Releasing an entry that was never loaded stays NotLoaded.
        let mut fresh = Entry::new("other", 4);
        fresh.release();
        assert_eq!(fresh.residency(), Residency::NotLoaded);
    }
}
