//! External service client
//!
//! One transport ([`HttpTransport`], `reqwest` in production) shared by two
//! separate users: blocking lookups ([`LookupClient`]) that feed routing, and
//! the queue service behind the poller. Every request carries a timeout and
//! is attempted once.

pub mod client;
pub mod lookup;
pub mod transport;

pub use client::ExternalServiceClient;
pub use lookup::{LookupClient, LookupOutcome};
pub use transport::{HttpMethod, HttpTransport, ReqwestTransport, ServiceRequest, ServiceResponse};
