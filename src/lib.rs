//! Gatekeeper - Request Admission Gate
//!
//! This crate decides, per client address, whether an incoming HTTP request
//! may proceed or must be rejected because the client exceeded its request
//! rate. Counters live in an external store (Redis) that increments and
//! re-arms a fixed window in one atomic step, so any number of replicas can
//! enforce one shared limit.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
