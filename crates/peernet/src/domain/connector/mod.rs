//! Outbound dial policy and probe scheduling.

mod policy;
mod schedule;

pub use policy::{DialAction, DialPlan, DialPolicy, DialPurpose};
pub use schedule::{poisson_interval, PoissonTimer};

#[cfg(test)]
mod tests;
