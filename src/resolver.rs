//! Account Existence Resolver
//!
//! [`AccountExistenceResolver::fetch_exists`] reports the truth, errors
//! included. [`AccountExistenceResolver::exists`] applies the fail-open
//! policy the assemblers use: any fetch error counts as "absent" and is
//! logged. Presence always comes from a successful fetch.

use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::metrics::metrics;
use crate::state_client::{CompressedStateClient, StateClientError};

#[derive(Clone, Copy)]
pub struct AccountExistenceResolver<'a> {
    client: &'a dyn CompressedStateClient,
}

impl<'a> AccountExistenceResolver<'a> {
    pub fn new(client: &'a dyn CompressedStateClient) -> Self {
        Self { client }
    }

    /// Whether `address` holds an account, without any error policy applied.
    pub async fn fetch_exists(&self, address: &Pubkey) -> Result<bool, StateClientError> {
        Ok(self.client.get_account(address).await?.is_some())
    }

    /// Fail-open existence: errors are treated as `false`.
    pub async fn exists(&self, address: &Pubkey) -> bool {
        match self.fetch_exists(address).await {
            Ok(found) => {
                debug!(address = %address, exists = found, "Resolved account existence");
                found
            }
            Err(e) => {
                metrics().existence_checks_failed_open.inc();
                warn!(
                    address = %address,
                    error = %e,
                    "Existence check failed, treating account as absent"
                );
                false
            }
        }
    }

    /// Resolve several unrelated addresses concurrently, in input order.
    pub async fn exists_many(&self, addresses: &[Pubkey]) -> Vec<bool> {
        join_all(addresses.iter().map(|a| self.exists(a))).await
    }
}
