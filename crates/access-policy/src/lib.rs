//! # access-policy
//!
//! Admission decisions for requests to a CKAN site. This crate loads a YAML
//! restriction policy, compiles its patterns once, and decides for every
//! request whether it may proceed, must be redirected to the login page, or
//! must be rejected.
//!
//! Rules are evaluated in a fixed order and the first denial wins:
//!
//! 1. exempt endpoints (login, static assets, health) always pass;
//! 2. anonymous visitors are redirected to login, when enabled;
//! 3. restricted API actions are rejected with `400 Invalid request`;
//! 4. restricted UI paths are rejected with a configurable "not found".
//!
//! Super-admins bypass 3 and 4.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use access_policy::{loader, IdentityDescriptor, PolicyEngine, RequestDescriptor};
//!
//! let config = loader::load_policy("policy.yaml").unwrap();
//! let engine = PolicyEngine::new(config).unwrap();
//! let req = RequestDescriptor::new("/api/action/status_show").with_api_action("status_show");
//! let outcome = engine.decide(&req, &IdentityDescriptor::Anonymous);
//! println!("{:?}", outcome);
//! ```

mod decision;
mod error;
mod evaluator;
pub mod exemptions;
pub mod loader;
pub mod matcher;
mod request;
pub mod rules;
mod schema;
mod shared;

// Re-export primary public API at crate root.
pub use decision::{Decision, Denial, Outcome, RejectBody, INVALID_REQUEST_MESSAGE};
pub use error::ConfigError;
pub use evaluator::PolicyEngine;
pub use exemptions::{ExemptionRegistry, LOGIN_ENDPOINT};
pub use request::{IdentityDescriptor, RequestDescriptor};
pub use schema::{
    keys, PathErrorConfig, PolicyConfig, DEFAULT_PATH_ERROR_CODE, DEFAULT_PATH_ERROR_MESSAGE,
};
pub use shared::SharedEngine;
