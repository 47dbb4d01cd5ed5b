//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (TCP or tunnel transport):
//!     → insecure.rs (reject plaintext unless terminated by a trusted proxy)
//!     → Pass to CORS and the rest of the pipeline
//!
//! Filesystem sockets skip this stage: access is governed by the
//! socket's ownership and mode bits.
//! ```
//!
//! # Design Decisions
//! - Fail closed: plaintext from an untrusted peer is rejected
//! - Health, readiness and metrics probes always pass
//! - Trust ranges are fixed when the pipeline is built

pub mod insecure;

pub use insecure::{reject_insecure_requests, InsecureGate, IpRange, TransportSecurity};
