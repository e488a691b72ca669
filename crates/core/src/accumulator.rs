use std::collections::HashMap;

/// Buffers partial text fragments per producer until they are finalized.
///
/// A producer's buffer is non-empty only between its first partial fragment
/// and the next non-partial fragment (or a turn boundary).
#[derive(Debug, Default)]
pub struct TextAccumulator {
    buffers: HashMap<String, String>,
}

impl TextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_partial(&mut self, producer: &str, fragment: &str) {
        self.buffers
            .entry(producer.to_string())
            .or_default()
            .push_str(fragment);
    }

    /// Returns everything buffered for `producer` followed by `fragment`, and
    /// clears the producer's buffer.
    pub fn finalize(&mut self, producer: &str, fragment: &str) -> String {
        let mut full = self.buffers.remove(producer).unwrap_or_default();
        full.push_str(fragment);
        full
    }

    pub fn clear_all(&mut self) {
        self.buffers.clear();
    }

    pub fn buffered(&self, producer: &str) -> Option<&str> {
        self.buffers
            .get(producer)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(String::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_concatenates_in_order() {
        let mut acc = TextAccumulator::new();
        acc.push_partial("P1", "Here ");
        acc.push_partial("P1", "are ");
        assert_eq!(acc.buffered("P1"), Some("Here are "));
        assert_eq!(acc.finalize("P1", "results."), "Here are results.");
        assert_eq!(acc.buffered("P1"), None);
    }

    #[test]
    fn test_producers_do_not_mix() {
        let mut acc = TextAccumulator::new();
        acc.push_partial("P1", "one ");
        acc.push_partial("P2", "alpha ");
        acc.push_partial("P1", "two ");
        assert_eq!(acc.finalize("P2", "beta"), "alpha beta");
        assert_eq!(acc.buffered("P1"), Some("one two "));
        assert_eq!(acc.finalize("P1", "three"), "one two three");
        assert!(acc.is_empty());
    }

    #[test]
    fn test_finalize_without_partials() {
        let mut acc = TextAccumulator::new();
        assert_eq!(acc.finalize("P1", "whole message"), "whole message");
        assert!(acc.is_empty());
    }

    #[test]
    fn test_clear_all() {
        let mut acc = TextAccumulator::new();
        acc.push_partial("P1", "Here ");
        acc.push_partial("P2", "There ");
        acc.clear_all();
        assert!(acc.is_empty());
        assert_eq!(acc.finalize("P1", "fresh"), "fresh");
    }
}
