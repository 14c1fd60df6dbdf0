//! The set of feeds asserting a single blocked host.

/// Sorted, duplicate-free list of source identifiers.
///
/// A host stays blocked for as long as at least one source asserts it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sources(Vec<String>);

impl Sources {
    pub fn new(source: &str) -> Self {
        Self(vec![source.to_string()])
    }

    /// Add `source`, keeping the list sorted. Adding twice is a no-op.
    pub fn add(&mut self, source: &str) {
        if let Err(pos) = self.search(source) {
            self.0.insert(pos, source.to_string());
        }
    }

    /// Remove `source`, returning whether it was present.
    pub fn remove(&mut self, source: &str) -> bool {
        match self.search(source) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn has(&self, source: &str) -> bool {
        self.search(source).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn search(&self, source: &str) -> Result<usize, usize> {
        self.0.binary_search_by(|s| s.as_str().cmp(source))
    }
}
