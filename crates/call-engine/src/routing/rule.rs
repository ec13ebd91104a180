use serde::{Deserialize, Serialize};

use super::pattern::AnchoredPattern;
use crate::action::Action;
use crate::error::{CallFlowError, Result};

/// Declared form of a routing rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    /// Pattern over the destination number
    pub pattern: String,
    /// Optional pattern the caller number must also match
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A compiled rule: destination pattern plus its action list
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub name: String,
    pub pattern: AnchoredPattern,
    pub caller: Option<AnchoredPattern>,
    pub actions: Vec<Action>,
}

impl RoutingRule {
    pub fn new(name: impl Into<String>, pattern: &str, actions: Vec<Action>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            pattern: AnchoredPattern::new(pattern)?,
            caller: None,
            actions,
        })
    }

    pub fn with_caller(mut self, pattern: &str) -> Result<Self> {
        self.caller = Some(AnchoredPattern::new(pattern)?);
        Ok(self)
    }

    fn matches(&self, destination: &str, caller: Option<&str>) -> Option<Vec<String>> {
        if let Some(required) = &self.caller {
            // An unknown caller never satisfies a caller condition
            if !caller.is_some_and(|caller| required.is_match(caller)) {
                return None;
            }
        }
        self.pattern.captures(destination)
    }
}

impl TryFrom<&RuleConfig> for RoutingRule {
    type Error = CallFlowError;

    fn try_from(config: &RuleConfig) -> Result<Self> {
        let pattern = AnchoredPattern::new(&config.pattern).map_err(|e| {
            CallFlowError::configuration(format!("rule '{}': {}", config.name, e))
        })?;
        let caller = config
            .caller
            .as_deref()
            .map(AnchoredPattern::new)
            .transpose()
            .map_err(|e| CallFlowError::configuration(format!("rule '{}': {}", config.name, e)))?;
        Ok(Self {
            name: config.name.clone(),
            pattern,
            caller,
            actions: config.actions.clone(),
        })
    }
}

/// The rule selected for a destination
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub rule: RoutingRule,
    /// Position of the rule in its declared list
    pub index: usize,
    /// Pattern captures, `$1` first
    pub captures: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched(RouteMatch),
    NoMatch,
}

impl MatchOutcome {
    pub fn into_match(self) -> Option<RouteMatch> {
        match self {
            MatchOutcome::Matched(m) => Some(m),
            MatchOutcome::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// First rule, in declared order, whose pattern matches the whole destination.
pub fn match_destination(destination: &str, rules: &[RoutingRule]) -> MatchOutcome {
    match_call(destination, None, rules)
}

/// Same as [`match_destination`], additionally honouring caller conditions.
///
/// Rules with a caller pattern are skipped when `caller` does not match it,
/// and also when no caller is given.
pub fn match_call(destination: &str, caller: Option<&str>, rules: &[RoutingRule]) -> MatchOutcome {
    for (index, rule) in rules.iter().enumerate() {
        if let Some(captures) = rule.matches(destination, caller) {
            return MatchOutcome::Matched(RouteMatch {
                rule: rule.clone(),
                index,
                captures,
            });
        }
    }
    MatchOutcome::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<RoutingRule> {
        vec![
            RoutingRule::new("extension", r"^\d{4}$", vec![Action::Answer]).unwrap(),
            RoutingRule::new("ivr", r"^123456$", vec![]).unwrap(),
            RoutingRule::new("national", r"\d+", vec![]).unwrap(),
        ]
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = rules();
        let m = match_destination("1234", &rules).into_match().unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.rule.name, "extension");

        // "123456" also matches "national", but "ivr" is declared first
        let m = match_destination("123456", &rules).into_match().unwrap();
        assert_eq!(m.rule.name, "ivr");

        let m = match_destination("12345", &rules).into_match().unwrap();
        assert_eq!(m.rule.name, "national");
    }

    #[test]
    fn no_match_when_nothing_matches() {
        assert!(!match_destination("abc", &rules()).is_match());
        assert!(!match_destination("1234", &[]).is_match());
    }

    #[test]
    fn caller_condition_filters_rules() {
        let rules = vec![
            RoutingRule::new("vip", r"\d{4}", vec![])
                .unwrap()
                .with_caller(r"\+1555.*")
                .unwrap(),
            RoutingRule::new("regular", r"\d{4}", vec![]).unwrap(),
        ];
        let m = match_call("1234", Some("+15551234567"), &rules).into_match().unwrap();
        assert_eq!(m.rule.name, "vip");
        let m = match_call("1234", Some("+4687654321"), &rules).into_match().unwrap();
        assert_eq!(m.rule.name, "regular");
        let m = match_call("1234", None, &rules).into_match().unwrap();
        assert_eq!(m.rule.name, "regular");
        let m = match_destination("1234", &rules).into_match().unwrap();
        assert_eq!(m.index, 1);
    }

    #[test]
    fn caller_only_rules_never_match_without_a_caller() {
        let rules = vec![RoutingRule::new("vip", r"\d{4}", vec![])
            .unwrap()
            .with_caller(r"\+1555.*")
            .unwrap()];
        assert!(!match_destination("1234", &rules).is_match());
        assert!(match_call("1234", Some("+15550001111"), &rules).is_match());
    }

    #[test]
    fn config_errors_name_the_rule() {
        let config = RuleConfig {
            name: "broken".into(),
            pattern: "(".into(),
            caller: None,
            actions: vec![],
        };
        let err = RoutingRule::try_from(&config).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
