//! A load test issuing `GET` requests against a load balancer endpoint at a constant arrival
//! rate.
//!
//! The [`Scenario`] is plain data: the arrival rate and time unit, the duration, and the size of
//! the virtual user pool. It can be exported as a k6 script or run directly with the built-in
//! [`executor`], which starts iterations at the configured rate independent of how long each
//! iteration takes.
//!
//! Every iteration records a single check, [`STATUS_CHECK`](scenario::STATUS_CHECK), which passes
//! if and only if the response status is `200`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod executor;
pub mod http;
pub mod scenario;

pub use crate::executor::run;
pub use crate::scenario::Scenario;
