//! # Call Orchestration
//!
//! Ties the components together for one inbound call: the dialplan picks a
//! rule, the action executor runs it, transfers loop back into routing, and
//! teardown guarantees hangup hooks, a final prompt on failure paths, and
//! removal from the registry.
//!
//! ## Examples
//!
//! ```rust
//! use callflow_call_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = CallFlowConfig::from_toml_str(r#"
//!     [[dialplan.contexts.default]]
//!     name = "extensions"
//!     pattern = '\d{4}'
//!     actions = [{ type = "bridge", target = "user/{d}@{domain}" }]
//! "#)?;
//!
//! let engine = Arc::new(CallFlowEngine::builder().with_config(config).build()?);
//! let channel = Arc::new(SimulatedChannel::new().answering("user/1234@pbx.local"));
//! let report = engine
//!     .spawn_call(InboundCall::new("1000", "1234", "pbx.local"), channel)
//!     .await??;
//! assert_eq!(report.routes(), vec!["extensions"]);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod report;

pub use engine::{CallFlowEngine, CallFlowEngineBuilder, EngineHook};
pub use report::{CallReport, MatchedRoute};
