//! String interning shared by the scope analyzer, IL compiler and snapshot
//! encoder.
//!
//! Mirrors the teacher crate's `intern.rs`: an insert-or-lookup builder used
//! during compilation, consumed into a read-only table once compilation
//! finishes. Interning keeps identifier/property names and string literals
//! as cheap-to-compare indices instead of cloned `String`s, and gives the
//! snapshot encoder a ready-made string table (spec §4.3 step 4).

use ahash::AHashMap;

/// Index into the interner's string storage.
///
/// `u32` rather than `usize` so it matches the snapshot format's 16-bit
/// logical addressing scheme without widening conversions scattered
/// everywhere; the interner itself never holds more than `u32::MAX` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    #[inline]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A string interner used while scope-analyzing and compiling one module.
///
/// Interning the same string twice returns the same [`StringId`]; this is
/// what lets `Binding::name` equality checks and `GlobalSlot` name
/// disambiguation compare `StringId`s instead of `str`s.
#[derive(Debug, Default)]
pub struct InternerBuilder {
    index: AHashMap<String, StringId>,
    strings: Vec<String>,
}

impl InternerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a builder seeded with `interns`' strings at their existing
    /// ids, so further interning (e.g. the IL compiler's runtime string
    /// literals) extends the same id space instead of renumbering it.
    pub fn from_interns(interns: &Interns) -> Self {
        let mut index = AHashMap::with_capacity(interns.len());
        let mut strings = Vec::with_capacity(interns.len());
        for (id, s) in interns.iter() {
            index.insert(s.to_owned(), id);
            strings.push(s.to_owned());
        }
        Self { index, strings }
    }

    /// Interns `s`, returning its `StringId`.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), id);
        id
    }

    /// Looks up a string by id.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this interner.
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Consumes the builder into the read-only table owned by the finished
    /// `ScopeModel`/`IlUnit`/snapshot pipeline.
    pub fn into_interns(self) -> Interns {
        Interns { strings: self.strings }
    }

    /// Snapshots the current table without consuming the builder, for a
    /// running [`crate::hostvm::Executor`] that keeps interning after
    /// `createSnapshotInfo` is called.
    pub fn snapshot_interns(&self) -> Interns {
        Interns {
            strings: self.strings.clone(),
        }
    }
}

/// Read-only string table produced by [`InternerBuilder::into_interns`].
///
/// This is exactly the data the snapshot encoder interns into the string
/// table region (spec §4.3 step 4): iterate `iter()` in id order to get the
/// string table in the order referencing allocations expect.
#[derive(Debug, Clone, Default)]
pub struct Interns {
    strings: Vec<String>,
}

impl Interns {
    /// Looks up a string by id.
    ///
    /// # Panics
    /// Panics if `id` is out of range for this table.
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringId, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StringId::from_index(i as u32), s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_string_twice_returns_the_same_id() {
        let mut builder = InternerBuilder::new();
        let a = builder.intern("thisModule");
        let b = builder.intern("thisModule");
        assert_eq!(a, b);
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn distinct_strings_get_distinct_ids() {
        let mut builder = InternerBuilder::new();
        let a = builder.intern("foo");
        let b = builder.intern("bar");
        assert_ne!(a, b);

        let interns = builder.into_interns();
        assert_eq!(interns.get(a), "foo");
        assert_eq!(interns.get(b), "bar");
    }
}
