use std::collections::HashMap;

/// A case-preserving, last-write-wins header map, as used by [`Request`][crate::Request].
///
/// lookups are case-insensitive; the stored key/value text preserves whatever casing the wire
/// delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, (String, String)>,
}

impl Headers {
    /// An empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, overwriting any prior value for the same name (last-write-wins).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        self.entries.insert(name.to_ascii_lowercase(), (name, value));
    }

    /// Look up a header's value by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    /// True if a header with this name (case-insensitively) is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate over `(original-case name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct header names stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no headers are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn last_write_wins() {
        let mut headers = Headers::new();
        headers.insert("X-Thing", "first");
        headers.insert("x-thing", "second");
        assert_eq!(headers.get("X-Thing"), Some("second"));
        assert_eq!(headers.len(), 1);
    }
}
