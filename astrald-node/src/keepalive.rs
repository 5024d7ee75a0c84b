use astrald_identity::Identity;
use astrald_net::{Address, NetError};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// reconnect backoff, in seconds, indexed by consecutive failure count
///
/// clamps to the last entry once `errc` exceeds the table's length,
/// ported directly from the reference node's relink schedule.
const RELINK_INTERVALS_SECS: &[u64] = &[
    5, 5, 15, 30, 60, 60, 60, 60, 60, 60, 60, 60, 60, 300, 300, 300, 300, 900,
];

/// how often a keepalive task re-checks whether a better link to its
/// identity has appeared, independent of whether it needs to reconnect
const CHECK_BEST_LINK_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn backoff(errc: usize) -> Duration {
    let index = errc.min(RELINK_INTERVALS_SECS.len() - 1);
    Duration::from_secs(RELINK_INTERVALS_SECS[index])
}

/// looks up addresses to try for an identity
///
/// injected so keepalive's backoff/scheduling logic doesn't need a
/// concrete directory implementation to be exercised or tested.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, identity: &Identity) -> Vec<Address>;
}

/// what a keepalive task needs to dial out and learn about its
/// currently live links
#[async_trait]
pub trait Dialer: Send + Sync {
    /// true if there is already a live link to `identity`
    fn has_link(&self, identity: &Identity) -> bool;

    /// attempt to establish a new link to `identity` at one of `addresses`
    async fn dial(&self, identity: &Identity, addresses: Vec<Address>) -> Result<(), NetError>;
}

/// keeps a single sticky identity linked, backing off on repeated
/// failure and re-checking periodically even while already linked
pub async fn keepalive(identity: Identity, resolver: Arc<dyn Resolver>, dialer: Arc<dyn Dialer>) {
    let mut errc = 0usize;

    loop {
        if !dialer.has_link(&identity) {
            let addresses = resolver.resolve(&identity).await;

            if addresses.is_empty() {
                tracing::debug!(peer = %identity, "no known addresses, will retry");
            } else {
                match dialer.dial(&identity, addresses).await {
                    Ok(()) => {
                        tracing::info!(peer = %identity, "relinked");
                        errc = 0;
                    }
                    Err(error) => {
                        tracing::debug!(peer = %identity, reason = ?error, attempt = errc, "relink failed");
                        errc = errc.saturating_add(1);
                    }
                }
            }
        }

        let wait = if dialer.has_link(&identity) {
            CHECK_BEST_LINK_INTERVAL
        } else {
            backoff(errc)
        };

        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_clamps_to_the_last_entry() {
        assert_eq!(backoff(0), Duration::from_secs(5));
        assert_eq!(backoff(2), Duration::from_secs(15));
        assert_eq!(backoff(17), Duration::from_secs(900));
        assert_eq!(backoff(1000), Duration::from_secs(900));
    }
}
