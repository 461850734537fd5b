//! Service layer: worker flows plus the assembly that wires the domain to
//! the adapters.
//!
//! - `context` holds the state every flow shares.
//! - `api` implements the operator-facing control port.
//! - `io`, `connector`, `dispatch`, `bootstrap` are the long-running flows.
//! - `runtime` assembles everything and owns the staged teardown.

mod api;
mod bootstrap;
mod connector;
mod context;
mod dispatch;
mod io;
mod runtime;

pub use runtime::NetService;
