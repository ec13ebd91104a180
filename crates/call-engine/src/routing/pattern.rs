use regex::Regex;

use crate::error::Result;

/// A regular expression that must match the whole input
///
/// Patterns written with or without `^...$` behave the same: the source is
/// always wrapped as `^(?:pattern)$`, so `\d{4}` never matches `12345`.
#[derive(Debug, Clone)]
pub struct AnchoredPattern {
    source: String,
    regex: Regex,
}

impl AnchoredPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as declared
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    /// Capture groups of a full match, `$1` first. Unmatched groups are empty.
    pub fn captures(&self, input: &str) -> Option<Vec<String>> {
        self.regex.captures(input).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
    }
}

/// Ordered (pattern, value) pairs where the first matching pattern wins
///
/// Order is the declared order and is never changed after construction.
#[derive(Debug, Clone)]
pub struct PriorityTable<T> {
    entries: Vec<(AnchoredPattern, T)>,
}

impl<T> Default for PriorityTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> PriorityTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pattern: &str, value: T) -> Result<()> {
        self.entries.push((AnchoredPattern::new(pattern)?, value));
        Ok(())
    }

    pub fn with(mut self, pattern: &str, value: T) -> Result<Self> {
        self.push(pattern, value)?;
        Ok(self)
    }

    /// First entry whose pattern matches `input`
    pub fn lookup(&self, input: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.is_match(input))
            .map(|(_, value)| value)
    }

    /// Like [`lookup`](Self::lookup) but also returns the entry index
    pub fn lookup_indexed(&self, input: &str) -> Option<(usize, &T)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, (pattern, _))| pattern.is_match(input))
            .map(|(index, (_, value))| (index, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchoring_prevents_prefix_collisions() {
        let four = AnchoredPattern::new(r"\d{4}").unwrap();
        assert!(four.is_match("1234"));
        assert!(!four.is_match("12345"));
        assert!(!four.is_match("x1234"));

        // already-anchored sources behave the same
        let explicit = AnchoredPattern::new(r"^\d{4}$").unwrap();
        assert!(explicit.is_match("1234"));
        assert!(!explicit.is_match("123456"));
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let pattern = AnchoredPattern::new("10|20").unwrap();
        assert!(pattern.is_match("10"));
        assert!(!pattern.is_match("100"));
        assert!(!pattern.is_match("120"));
    }

    #[test]
    fn captures_skip_whole_match() {
        let pattern = AnchoredPattern::new(r"9(\d+)").unwrap();
        assert_eq!(pattern.captures("9555"), Some(vec!["555".to_string()]));
        assert_eq!(pattern.captures("555"), None);
    }

    #[test]
    fn first_entry_wins() {
        let table = PriorityTable::new()
            .with("(?i)pep.*", "pepperoni")
            .unwrap()
            .with("(?i)p.*", "plain")
            .unwrap();
        assert_eq!(table.lookup("Pepperoni"), Some(&"pepperoni"));
        assert_eq!(table.lookup("pineapple"), Some(&"plain"));
        assert_eq!(table.lookup_indexed("pineapple"), Some((1, &"plain")));
        assert_eq!(table.lookup("ham"), None);
    }

    #[test]
    fn rejects_invalid_pattern() {
        assert!(AnchoredPattern::new("(unclosed").is_err());
    }
}
