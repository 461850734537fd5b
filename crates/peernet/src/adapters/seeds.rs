//! Seed host resolution.
//!
//! Name resolution happens on the runtime's blocking pool via `lookup_host`,
//! so a slow resolver stalls only the bootstrap flow. Each seed's answer is
//! capped so one operator cannot flood the address book, and failures are
//! just an empty answer; seeds are best-effort by nature.

use std::collections::HashSet;

use tokio::net::lookup_host;
use tracing::{debug, warn};

use crate::domain::types::Endpoint;

#[derive(Debug, Clone)]
pub struct SeedResolver {
    port: u16,
    max_per_seed: usize,
}

impl SeedResolver {
    pub fn new(port: u16, max_per_seed: usize) -> Self {
        Self {
            port,
            max_per_seed: max_per_seed.max(1),
        }
    }

    /// Resolves one seed host to at most `max_per_seed` distinct endpoints.
    pub async fn resolve(&self, host: &str) -> Vec<Endpoint> {
        let answers = match lookup_host((host, self.port)).await {
            Ok(answers) => answers,
            Err(err) => {
                warn!(seed = host, error = %err, "seed resolution failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut endpoints = Vec::new();
        for addr in answers {
            let endpoint = Endpoint::from(addr);
            if seen.insert(endpoint) {
                endpoints.push(endpoint);
                if endpoints.len() >= self.max_per_seed {
                    break;
                }
            }
        }
        debug!(seed = host, count = endpoints.len(), "seed resolved");
        endpoints
    }
}
