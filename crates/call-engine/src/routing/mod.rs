//! # Call Routing Module
//!
//! Decides where an inbound call goes by matching its destination against
//! the ordered rules of a dialplan context.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Inbound call (destination, caller)    │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │   Dialplan context: rules in declared order  │
//! │   ^(?:pattern)$ against the full destination │
//! └──────────────────────┬───────────────────────┘
//!            ┌───────────┼───────────────┐
//!            │           │               │
//!   ┌────────▼──────┐ ┌──▼────────────┐ ┌▼─────────┐
//!   │ First matched │ │ E.164 number: │ │  Reject  │
//!   │ rule's actions│ │ external trunk│ │          │
//!   └───────────────┘ └───────────────┘ └──────────┘
//! ```
//!
//! Rule order is part of the deployed configuration. Overlapping patterns
//! (a 4-digit extension and a longer national number) rely on it, so rules
//! are never reordered after loading.
//!
//! [`PriorityTable`] applies the same first-match discipline to anything
//! else keyed by pattern, such as wizard aliases.

pub mod dialplan;
pub mod pattern;
pub mod rule;
pub mod template;

pub use dialplan::{Dialplan, RouteDecision};
pub use pattern::{AnchoredPattern, PriorityTable};
pub use rule::{match_call, match_destination, MatchOutcome, RouteMatch, RoutingRule, RuleConfig};
pub use template::{expand, TemplateSource};
