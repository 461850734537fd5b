//! Integration scenarios over loopback sockets.

pub mod support;

mod admission;
mod anchors;
mod shutdown_sequence;
mod two_node_session;
