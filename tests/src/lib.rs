//! # Peernet Test Suite
//!
//! Integration scenarios that start whole connection-manager services and
//! drive them over loopback sockets.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs            # Shared fixtures (handlers, configs, polling)
//!     ├── two_node_session.rs   # Two services exchanging frames
//!     ├── admission.rs          # Inbound caps and eviction under load
//!     ├── shutdown_sequence.rs  # Staged teardown with live peers
//!     └── anchors.rs            # Block-relay anchor capture and redial
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p peernet-tests
//!
//! # By scenario
//! cargo test -p peernet-tests integration::two_node_session
//! ```

#![allow(dead_code)]

pub mod integration;
