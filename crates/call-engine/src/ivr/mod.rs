//! IVR prompt/collect engine
//!
//! [`collect`] holds the per-attempt digit buffer and timeout handling,
//! [`engine`] the retrying prompt loop, and [`menu`] / [`wizard`] the two
//! flows built on it.

pub mod collect;
pub mod engine;
pub mod menu;
pub mod wizard;

pub use collect::{collect_digits, CollectContext, CollectControl, CollectResult, CollectSettings, StopReason};
pub use engine::{ConfirmSpec, PromptCollectEngine, PromptOutcome, PromptRun, PromptSpec, PromptState};
pub use menu::{IvrMenu, MenuOutcome};
pub use wizard::{Wizard, WizardOutcome, WizardSlot};
