/// A parsed dial string
///
/// `a,b|c` rings `a` and `b` together; if neither answers, `c` is tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialString {
    groups: Vec<Vec<String>>,
}

impl DialString {
    pub fn parse(input: &str) -> Self {
        let groups = input
            .split('|')
            .map(|group| {
                group
                    .split(',')
                    .map(str::trim)
                    .filter(|candidate| !candidate.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();
        Self { groups }
    }

    /// Failover groups in order; each holds candidates rung in parallel
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn candidate_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_and_failover() {
        let dial = DialString::parse("user/1000@pbx, user/1001@pbx | sofia/gateway/gw/555");
        assert_eq!(
            dial.groups(),
            &[
                vec!["user/1000@pbx".to_string(), "user/1001@pbx".to_string()],
                vec!["sofia/gateway/gw/555".to_string()],
            ]
        );
        assert_eq!(dial.candidate_count(), 3);
    }

    #[test]
    fn empty_candidates_are_dropped() {
        assert!(DialString::parse(" , | ").is_empty());
        assert_eq!(DialString::parse("a,,b").candidate_count(), 2);
    }
}
