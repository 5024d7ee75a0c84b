pub mod config;

pub use self::config::Config;

use crate::keepalive;
use astrald_identity::Identity;
use astrald_net::{handshake::race_outbound, transport::tcp, Address, Handle, Link, NetError};
use astrald_router::{
    events::EventSender, services::Handler, view::PeerView, RerouteService, Registration, Registry,
    Router, RouterService, REROUTE_SERVICE_NAME, ROUTER_SERVICE_NAME,
};
use rand::rngs::OsRng;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// the live network half of a node: accepts inbound links, dials
/// outbound ones, and keeps the peer view / router in sync with both
pub struct Network {
    local_id: Identity,
    view: Arc<PeerView>,
    services: Arc<Registry>,
    router: Arc<Router>,
    config: Config,
    _router_service: Option<Registration>,
    _reroute_service: Option<Registration>,
}

impl Network {
    pub fn new(local_id: Identity, config: Config, events: EventSender) -> Arc<Self> {
        let view = Arc::new(PeerView::new(events.clone()));
        let services = Arc::new(Registry::new(events.clone()));
        let router = Router::new(
            local_id.clone(),
            view.clone(),
            services.clone(),
            events,
            astrald_router::NonceGenerator::new(&mut OsRng),
        );

        let handler: Arc<dyn Handler> = Arc::new(RouterService::new(&router));
        let router_service = match services.register(local_id.clone(), ROUTER_SERVICE_NAME, handler) {
            Ok(registration) => Some(registration),
            Err(error) => {
                tracing::error!(reason = ?error, "cannot register router meta-service");
                None
            }
        };

        let handler: Arc<dyn Handler> = Arc::new(RerouteService::new(&router));
        let reroute_service = match services.register(local_id.clone(), REROUTE_SERVICE_NAME, handler) {
            Ok(registration) => Some(registration),
            Err(error) => {
                tracing::error!(reason = ?error, "cannot register reroute meta-service");
                None
            }
        };

        Arc::new(Self {
            local_id,
            view,
            services,
            router,
            config,
            _router_service: router_service,
            _reroute_service: reroute_service,
        })
    }

    pub fn local_id(&self) -> &Identity {
        &self.local_id
    }

    pub fn view(&self) -> &Arc<PeerView> {
        &self.view
    }

    pub fn services(&self) -> &Arc<Registry> {
        &self.services
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// bind the listen address and accept inbound links until this
    /// task is aborted
    ///
    /// every accepted connection's handshake runs in its own task, so
    /// one slow or malicious initiator can't stall the others.
    pub async fn listen(self: &Arc<Self>) -> anyhow::Result<()> {
        let listener = tcp::Listener::bind(self.config.listen_address).await?;
        tracing::info!(address = %self.config.listen_address, "listening for inbound links");

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let network = self.clone();

            tokio::spawn(async move {
                if let Err(error) = network.accept_one(stream, peer_addr).await {
                    tracing::debug!(peer_addr = %peer_addr, reason = ?error, "inbound handshake failed");
                }
            });
        }
    }

    async fn accept_one(self: Arc<Self>, stream: tokio::net::TcpStream, peer_addr: SocketAddr) -> anyhow::Result<()> {
        let secret = self
            .local_id
            .secret_key()
            .ok_or_else(|| anyhow::anyhow!("this node's identity has no secret key"))?;

        let (reader, writer) = stream.into_split();
        let handle: Handle<OwnedReadHalf, OwnedWriteHalf> = Handle::accept(OsRng, reader, writer)
            .accept(secret, |_remote| true)
            .await?;

        let remote_public = *handle.remote_public_identity();
        let remote_id = Identity::from_public_key(remote_public);
        tracing::info!(peer = %remote_id, peer_addr = %peer_addr, "accepted inbound link");

        self.install_link(remote_id, handle);
        Ok(())
    }

    /// dial `target` at the given addresses, racing a handshake against
    /// all of them and keeping the first that succeeds
    pub async fn connect(self: &Arc<Self>, target: Identity, addresses: Vec<Address>) -> Result<(), NetError> {
        let secret = self
            .local_id
            .secret_key()
            .ok_or_else(|| NetError::ProtocolError("this node's identity has no secret key".into()))?;

        let socket_addrs = addresses
            .iter()
            .filter_map(|address| tcp::socket_addr(address).ok())
            .collect::<Vec<SocketAddr>>();

        let handle = race_outbound(secret, *target.public_key(), socket_addrs, self.config.dial_workers).await?;
        tracing::info!(peer = %target, "dialed outbound link");

        self.install_link(target, handle);
        Ok(())
    }

    fn install_link(self: &Arc<Self>, remote_id: Identity, handle: Handle<OwnedReadHalf, OwnedWriteHalf>) {
        let (link, incoming) = Link::new(self.local_id.clone(), remote_id, handle);
        let link = Arc::new(link);

        self.view.add_link(link.clone());
        self.router.serve_incoming(link, incoming);
    }
}

/// adapts [`Network`] to the [`keepalive::Dialer`] interface
pub struct NetworkDialer(Arc<Network>);

impl NetworkDialer {
    pub fn new(network: Arc<Network>) -> Self {
        Self(network)
    }
}

#[async_trait::async_trait]
impl keepalive::Dialer for NetworkDialer {
    fn has_link(&self, identity: &Identity) -> bool {
        self.0.view.has_link(identity)
    }

    async fn dial(&self, identity: &Identity, addresses: Vec<Address>) -> Result<(), NetError> {
        self.0.connect(identity.clone(), addresses).await
    }
}
