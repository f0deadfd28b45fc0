//! # Gateway Routing
//!
//! Decides which provider and model serve a caller.
//!
//! Resolution is layered, first match wins:
//! 1. override for the exact user and service
//! 2. user-wide override
//! 3. per-service default from configuration
//! 4. global default
//!
//! The precedence function is pure. Checking the winner against the live
//! provider registry happens afterwards and fails closed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod resolver;

pub use resolver::{
    ensure_routable, resolve, OverrideResolver, RouteDecision, RouteSource, RouteTarget,
    RoutingDefaults,
};
