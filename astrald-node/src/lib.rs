/*!
# astrald node runtime

wires together the pieces of a running astrald node: a persisted
[`Identity`](astrald_identity::Identity), an address [`tracker`], live
[`network`] links, and a [`keepalive`] task per configured sticky peer.
*/
pub mod config;
pub mod keepalive;
pub mod network;
pub mod secret;
pub mod tracker;

pub use self::config::Config;

use anyhow::{Context as _, Result};
use network::{Network, NetworkDialer};
use std::sync::Arc;
use tracker::Tracker;

/// a running node: its network half plus the state backing it
///
/// dropping this stops nothing by itself: tasks already spawned onto
/// the runtime (keepalive, the listener, inbound handshakes) keep
/// running until the process shuts down.
pub struct Node {
    network: Arc<Network>,
    tracker: Arc<Tracker>,
}

impl Node {
    /// load or generate this node's identity, open its persisted state,
    /// and start the network half listening
    pub async fn start(config: Config, db: &sled::Db, events: astrald_router::EventSender) -> Result<Arc<Self>> {
        let identity = secret::load(config.secret).context("cannot load node identity")?;
        let tracker = Arc::new(Tracker::open(db).context("cannot open address tracker")?);
        let network = Network::new(identity, config.network, events);

        let node = Arc::new(Self { network, tracker });
        node.spawn_keepalives(config.peers)?;

        {
            let node = node.clone();
            tokio::spawn(async move {
                if let Err(error) = node.network.listen().await {
                    tracing::error!(reason = ?error, "listener task ended");
                }
            });
        }

        Ok(node)
    }

    fn spawn_keepalives(self: &Arc<Self>, peers: Vec<config::StickyPeer>) -> Result<()> {
        if peers.is_empty() {
            return Ok(());
        }

        let resolver: Arc<dyn keepalive::Resolver> = Arc::new(config::ConfiguredResolver::new(&peers)?);
        let dialer: Arc<dyn keepalive::Dialer> = Arc::new(NetworkDialer::new(self.network.clone()));

        for peer in peers {
            let identity = peer.identity()?;
            for address in peer.addresses() {
                if let Err(error) = self.tracker.remember(
                    &identity,
                    &address,
                    std::time::SystemTime::now() + std::time::Duration::from_secs(365 * 24 * 3600),
                ) {
                    tracing::warn!(reason = ?error, peer = %identity, "cannot seed tracker with configured address");
                }
            }

            let resolver = resolver.clone();
            let dialer = dialer.clone();
            tokio::spawn(keepalive::keepalive(identity, resolver, dialer));
        }

        Ok(())
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }
}
