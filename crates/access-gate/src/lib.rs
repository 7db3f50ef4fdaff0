//! HTTP admission gateway for a CKAN site.
//!
//! Every incoming request is described (path, endpoint id, API action),
//! paired with the caller's identity, and evaluated against the current
//! [`access_policy::PolicyEngine`] snapshot before it is relayed upstream.
//!
//! # Architecture
//!
//! ```text
//! Client  <--HTTP-->  access-gate  <--HTTP-->  CKAN
//!                         |
//!                   [Admission]
//!                         |
//!                   [Audit Sink]
//! ```
//!
//! Denied requests never reach CKAN: anonymous visitors are redirected to the
//! login page, restricted API actions get a JSON `400`, and restricted UI
//! paths get an HTML error page with the configured status.

pub mod admission;
pub mod endpoint;
pub mod identity;
pub mod relay;
pub mod server;

pub use admission::{admission, GateState};
pub use endpoint::EndpointResolver;
pub use identity::{IdentityResolver, TrustedHeaderResolver, DEFAULT_USER_HEADER};
pub use relay::Upstream;
pub use server::{build_router, Gateway, GatewayConfig};
