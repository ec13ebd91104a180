use std::collections::BTreeMap;
use tracing::{debug, info};

use super::pattern::AnchoredPattern;
use super::rule::{match_call, MatchOutcome, RouteMatch, RoutingRule};
use crate::config::CallFlowConfig;
use crate::error::{CallFlowError, Result};

/// What routing decided for a destination
#[derive(Debug, Clone)]
pub enum RouteDecision {
    /// A declared rule matched
    Rule(RouteMatch),
    /// No rule matched but the destination looks like a full E.164 number
    ExternalTrunk { target: String },
    /// No rule matched and no default applies
    Reject,
}

/// Compiled dialplan: ordered rules per context plus the no-match policy
#[derive(Debug, Clone)]
pub struct Dialplan {
    contexts: BTreeMap<String, Vec<RoutingRule>>,
    external_number: AnchoredPattern,
    gateway: String,
}

impl Dialplan {
    pub fn new(external_number_pattern: &str, gateway: impl Into<String>) -> Result<Self> {
        Ok(Self {
            contexts: BTreeMap::new(),
            external_number: AnchoredPattern::new(external_number_pattern)?,
            gateway: gateway.into(),
        })
    }

    pub fn from_config(config: &CallFlowConfig) -> Result<Self> {
        let mut dialplan = Self::new(
            &config.general.external_number_pattern,
            config.general.gateway.clone(),
        )?;
        for (name, rules) in &config.dialplan.contexts {
            let compiled = rules
                .iter()
                .map(RoutingRule::try_from)
                .collect::<Result<Vec<_>>>()?;
            dialplan.add_context(name.clone(), compiled);
        }
        Ok(dialplan)
    }

    /// Install the rules of a context, replacing any previous list
    pub fn add_context(&mut self, name: impl Into<String>, rules: Vec<RoutingRule>) {
        self.contexts.insert(name.into(), rules);
    }

    pub fn has_context(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }

    pub fn rules(&self, context: &str) -> Option<&[RoutingRule]> {
        self.contexts.get(context).map(Vec::as_slice)
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub fn route(&self, context: &str, destination: &str) -> Result<RouteDecision> {
        self.route_call(context, destination, None)
    }

    /// Route with the caller number available to caller conditions
    pub fn route_call(
        &self,
        context: &str,
        destination: &str,
        caller: Option<&str>,
    ) -> Result<RouteDecision> {
        let rules = self
            .contexts
            .get(context)
            .ok_or_else(|| CallFlowError::not_found(format!("dialplan context '{}'", context)))?;

        match match_call(destination, caller, rules) {
            MatchOutcome::Matched(m) => {
                info!(context, destination, rule = %m.rule.name, index = m.index, "route matched");
                Ok(RouteDecision::Rule(m))
            }
            MatchOutcome::NoMatch if self.external_number.is_match(destination) => {
                let target = format!("{}/{}", self.gateway.trim_end_matches('/'), destination);
                info!(context, destination, %target, "no rule matched, routing to external trunk");
                Ok(RouteDecision::ExternalTrunk { target })
            }
            MatchOutcome::NoMatch => {
                debug!(context, destination, "no rule matched");
                Ok(RouteDecision::Reject)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    fn dialplan() -> Dialplan {
        let mut dp = Dialplan::new(r"^\+?[1-9]\d{6,14}$", "sofia/gateway/default").unwrap();
        dp.add_context(
            "default",
            vec![
                RoutingRule::new("extension", r"^\d{4}$", vec![Action::Answer]).unwrap(),
                RoutingRule::new("ivr", r"^123456$", vec![]).unwrap(),
            ],
        );
        dp
    }

    #[test]
    fn matched_rule_is_returned() {
        match dialplan().route("default", "1234").unwrap() {
            RouteDecision::Rule(m) => assert_eq!(m.rule.name, "extension"),
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn e164_falls_to_external_trunk() {
        match dialplan().route("default", "+46851758284").unwrap() {
            RouteDecision::ExternalTrunk { target } => {
                assert_eq!(target, "sofia/gateway/default/+46851758284")
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn short_unknown_number_is_rejected() {
        assert!(matches!(
            dialplan().route("default", "99").unwrap(),
            RouteDecision::Reject
        ));
    }

    #[test]
    fn unknown_context_is_not_found() {
        let err = dialplan().route("nowhere", "1234").unwrap_err();
        assert!(matches!(err, CallFlowError::NotFound(_)));
    }
}
