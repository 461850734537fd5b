//! # Adapters Layer
//!
//! Concrete implementations behind the ports: real sockets, real files,
//! real clocks.
//!
//! - `listener` / `dialer` - TCP accept and connect, tuned via socket2
//! - `mux` - the two event multiplexer strategies and startup selection
//! - `address_book` - in-memory two-table address source
//! - `persist` - address database and anchors flat files
//! - `seeds` - seed host resolution
//! - `clock` - system and fixed time sources

pub mod address_book;
pub mod clock;
pub mod dialer;
pub mod listener;
pub mod mux;
pub mod persist;
pub mod seeds;

pub use address_book::AddressBook;
pub use clock::{FixedTimeSource, SystemTimeSource};
pub use dialer::Dialer;
pub use listener::{AcceptedSocket, ListenerSet};
pub use mux::{select_multiplexer, ReadinessMultiplexer, ScanMultiplexer};
pub use persist::{
    load_addresses, load_addresses_or_reset, save_addresses, save_anchors, take_anchors,
    ADDRESS_DB_FILE, ANCHORS_FILE,
};
pub use seeds::SeedResolver;
