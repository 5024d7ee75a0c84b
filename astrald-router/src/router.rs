use crate::{
    events::{Event, EventSender},
    query::{Nonce, NonceGenerator, Origin, Query},
    services::{Handler, Registry},
    transit::{QueryParams, QueryResponse},
    view::PeerView,
    writer::{IdentityTranslationWriter, LocalServiceWriter, SwitchWriter, Writer},
};
use astrald_identity::{Certificate, Identity};
use astrald_net::{mux::SubstreamReader, IncomingQueries, IncomingQuery, Link, NetError};
use bytes::{BufMut as _, Bytes, BytesMut};
use futures::StreamExt as _;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::mpsc;

/// the name every node binds its own meta-service under, used to ask a
/// linked peer to forward a query to some other identity on our behalf
pub const ROUTER_SERVICE_NAME: &str = "router";

/// the name every node binds its reroute confirmation service under
pub const REROUTE_SERVICE_NAME: &str = "reroute";

/// how long an attached caller certificate remains valid for
const CERT_TTL_NANOS: u64 = 60_000_000_000;

/// clock skew tolerated when verifying a transit certificate's expiry
const CERT_SKEW: Duration = Duration::from_secs(30);

/// how long a query is given to find and wire a route before failing
/// with `NetError::Timeout`
const QUERY_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(60);

/// decides how to answer a [`Query`] and wires the byte pumps that
/// carry its traffic once a route is found
///
/// three routing strategies are tried in order: local (the target is
/// this node), direct (there is a live link straight to the target),
/// and transit (ask a linked peer's own `router` service to forward
/// the query further). each strategy produces a `target_writer`: a
/// [`Writer`] request bytes from the caller should be written into.
pub struct Router {
    local_id: Identity,
    view: Arc<PeerView>,
    services: Arc<Registry>,
    nonces: NonceGenerator,
    events: EventSender,
    /// every query this node has an active splice point for, keyed by
    /// nonce so a later `reroute` can rebuild and retarget it
    queries: Mutex<HashMap<Nonce, ActiveRoute>>,
}

/// everything `reroute` needs to rebuild a query's downstream leg
/// through a different router and splice it into the live chain
struct ActiveRoute {
    caller: Identity,
    target: Identity,
    name: String,
    cert: Option<Certificate>,
    caller_writer: Arc<Writer>,
    switch: Arc<Writer>,
}

impl Router {
    pub fn new(local_id: Identity, view: Arc<PeerView>, services: Arc<Registry>, events: EventSender, nonces: NonceGenerator) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            view,
            services,
            nonces,
            events,
            queries: Mutex::new(HashMap::new()),
        })
    }

    pub fn local_id(&self) -> &Identity {
        &self.local_id
    }

    /// find and wire a route for `query`, returning the writer request
    /// bytes should flow into
    ///
    /// establishment is bounded by [`QUERY_ESTABLISH_TIMEOUT`]; a route
    /// that doesn't resolve in time fails with `NetError::Timeout`
    /// rather than hanging the caller indefinitely.
    pub async fn route_query(self: &Arc<Self>, query: Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        let _ = self.events.send(Event::QueryOpened { query: query.clone() });

        let result = match tokio::time::timeout(QUERY_ESTABLISH_TIMEOUT, self.route_inner(&query, caller_writer)).await {
            Ok(result) => result,
            Err(_) => Err(NetError::Timeout),
        };
        if result.is_err() {
            let _ = self.events.send(Event::QueryClosed { nonce: query.nonce });
        }
        result
    }

    /// a query this node is only relaying (`caller` isn't this node)
    /// must always keep flowing through the next hop's `router`
    /// meta-service, even when a direct link to `target` exists:
    /// a plain link query's wire header carries no caller identity, so
    /// only the certificate-carrying transit path lets `target` recover
    /// the real `caller` instead of whichever peer physically forwarded it
    async fn route_inner(self: &Arc<Self>, query: &Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        if query.target == self.local_id || self.services.has_handler(&query.target, &query.name) {
            return self.route_local(query, caller_writer).await;
        }

        if query.caller == self.local_id && self.view.has_link(&query.target) {
            return self.route_direct(query, caller_writer).await;
        }

        self.route_transit(query, caller_writer).await
    }

    async fn route_local(&self, query: &Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        let handler = self
            .services
            .lookup(&query.target, &query.name)
            .ok_or(NetError::RouteNotFound)?;

        handler.open(query.clone(), caller_writer).await
    }

    /// open a substream straight to the target over the best currently
    /// live link, and wire a pump carrying its responses back
    ///
    /// the returned writer is a [`Writer::Switch`]: its current output
    /// can later be swapped by [`reroute`](Self::reroute) if the
    /// underlying link is replaced, without the caller ever needing to
    /// reopen anything.
    async fn route_direct(self: &Arc<Self>, query: &Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        let link = self.view.best_link(&query.target).ok_or(NetError::RouteNotFound)?;
        let substream = link.open_query(query.nonce.get(), &query.name).await?;
        let (reader, writer) = substream.split();

        let switch = Arc::new(Writer::Switch(SwitchWriter::new(Arc::new(Writer::LinkSubstream(writer)))));
        self.queries.lock().unwrap().insert(
            query.nonce,
            ActiveRoute {
                caller: query.caller.clone(),
                target: query.target.clone(),
                name: query.name.clone(),
                cert: query.cert.clone(),
                caller_writer: caller_writer.clone(),
                switch: switch.clone(),
            },
        );

        let router = self.clone();
        let nonce = query.nonce;
        tokio::spawn(async move {
            pump_reader_to_writer(reader, caller_writer).await;
            router.queries.lock().unwrap().remove(&nonce);
        });

        Ok(switch)
    }

    /// retarget a live query through `new_router_identity`, splicing
    /// its freshly-built downstream leg into the query's switch point
    /// without the caller ever needing to reopen anything
    ///
    /// carries out §4.6's three-step splice: confirm the new router is
    /// willing to take over this nonce, build the new leg via the
    /// ordinary transit path, then commit it and close whatever it
    /// replaces. a failure after the new leg is built rolls it back by
    /// closing it and leaving the old chain untouched.
    pub async fn reroute(self: &Arc<Self>, nonce: Nonce, new_router_identity: Identity) -> Result<(), NetError> {
        let (caller, target, name, cert, caller_writer, switch) = {
            let queries = self.queries.lock().unwrap();
            let route = queries.get(&nonce).ok_or(NetError::RouteNotFound)?;
            (
                route.caller.clone(),
                route.target.clone(),
                route.name.clone(),
                route.cert.clone(),
                route.caller_writer.clone(),
                route.switch.clone(),
            )
        };

        let link = self.view.best_link(&new_router_identity).ok_or(NetError::RouteNotFound)?;

        let mut payload = BytesMut::with_capacity(8);
        payload.put_u64(nonce.get());
        let substream = link.open_query(nonce.get(), REROUTE_SERVICE_NAME).await?;
        let (mut reader, writer) = substream.split();
        writer.write_all(payload.freeze()).await?;

        let status = read_status_byte(&mut reader).await?;
        let _ = writer.close().await;
        if status != 0 {
            return Err(NetError::RerouteRejected);
        }

        let mut new_query = Query::new(caller, target, name, nonce, Origin::Local);
        if let Some(cert) = cert {
            new_query = new_query.with_cert(cert);
        }

        let new_leg = self.try_transit_via(&new_router_identity, &new_query, caller_writer).await?;

        match switch.reroute(new_leg.clone()).await {
            Some(old) => {
                let _ = old.close().await;
                Ok(())
            }
            None => {
                let _ = new_leg.close().await;
                Err(NetError::ProtocolError("query is not reroutable".into()))
            }
        }
    }

    /// resolve the certificate to attach to an outgoing transit
    /// request: reuse one already carried by the query (forwarding it
    /// across a relay hop needs no re-signing, since the subject is
    /// always the ultimate target), or sign a fresh one
    ///
    /// only possible when the caller is an identity this node can act
    /// as; a query forwarded on behalf of someone else's caller, with
    /// no certificate already attached, has no way to prove that
    /// caller's identity and is refused outright.
    fn resolve_caller_certificate(&self, query: &Query) -> Result<Certificate, NetError> {
        if let Some(cert) = &query.cert {
            return Ok(cert.clone());
        }

        if !query.caller.has_secret_key() {
            return Err(NetError::RouteNotFound);
        }

        let expires = now_unix_nanos().saturating_add(CERT_TTL_NANOS);
        Certificate::sign(&query.caller, &query.target, expires)
            .map_err(|_| NetError::ProtocolError("failed to sign caller certificate".into()))
    }

    /// ask every other linked peer in turn to forward the query, in no
    /// particular order; the first one to accept wins
    ///
    /// candidate discovery is brute-force: every currently linked
    /// identity is tried as a transit router, including `target` itself
    /// when it is directly linked — relaying on someone else's behalf
    /// must still go through `target`'s own `router` service so it
    /// recovers the real caller from the certificate rather than from
    /// the physical link. picking a path by metric or topology is out
    /// of scope here.
    async fn route_transit(self: &Arc<Self>, query: &Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        for via in self.view.known_identities() {
            if via == query.caller {
                continue;
            }

            match self.try_transit_via(&via, query, caller_writer.clone()).await {
                Ok(writer) => return Ok(writer),
                Err(error) => {
                    tracing::debug!(%via, reason = ?error, "transit candidate declined");
                    continue;
                }
            }
        }

        Err(NetError::RouteNotFound)
    }

    async fn try_transit_via(self: &Arc<Self>, via: &Identity, query: &Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        let link = self.view.best_link(via).ok_or(NetError::RouteNotFound)?;
        let cert = self.resolve_caller_certificate(query)?;

        let params = QueryParams {
            target: query.target.clone(),
            name: query.name.clone(),
            nonce: query.nonce.get(),
            cert: Some(cert.clone()),
        };

        let substream = link.open_query(self.nonces.next().get(), ROUTER_SERVICE_NAME).await?;
        let (mut reader, writer) = substream.split();

        writer.write_all(params.encode()).await?;
        let response_bytes = read_frame(&mut reader).await?;
        let _response = QueryResponse::decode(response_bytes)?;

        let switch = Arc::new(Writer::Switch(SwitchWriter::new(Arc::new(Writer::LinkSubstream(writer)))));
        self.queries.lock().unwrap().insert(
            query.nonce,
            ActiveRoute {
                caller: query.caller.clone(),
                target: query.target.clone(),
                name: query.name.clone(),
                cert: Some(cert),
                caller_writer: caller_writer.clone(),
                switch: switch.clone(),
            },
        );

        let router = self.clone();
        let nonce = query.nonce;
        tokio::spawn(async move {
            pump_reader_to_writer(reader, caller_writer).await;
            router.queries.lock().unwrap().remove(&nonce);
        });

        // downstream of a transit hop, the physical writer points at
        // `via`; assert `target`'s identity instead so consumers on the
        // caller side see the end-to-end pair, not the relay
        Ok(Arc::new(Writer::IdentityTranslation(IdentityTranslationWriter::new(
            switch,
            query.target.clone(),
        ))))
    }

    /// accept inbound queries on a freshly established link for as
    /// long as it stays up
    pub fn serve_incoming(self: &Arc<Self>, link: Arc<Link>, mut incoming: IncomingQueries) {
        let router = self.clone();
        tokio::spawn(async move {
            while let Some(query) = incoming.next_query().await {
                let router = router.clone();
                let link = link.clone();
                tokio::spawn(async move { router.serve_one(link, query).await });
            }
        });
    }

    async fn serve_one(self: Arc<Self>, link: Arc<Link>, incoming: IncomingQuery) {
        let query = Query::new(
            link.remote_id().clone(),
            link.local_id().clone(),
            incoming.name().to_owned(),
            Nonce::new(incoming.nonce()),
            Origin::Network,
        );

        // cloned before any status byte is sent: writing to the
        // substream doesn't require having accepted it, only the
        // status byte convention does
        let caller_writer = Arc::new(Writer::LinkSubstream(incoming.writer()));

        match self.route_query(query, caller_writer).await {
            Ok(target_writer) => {
                if incoming.respond_accepted().await.is_err() {
                    let _ = target_writer.close().await;
                    return;
                }
                let reader = incoming.into_reader();
                tokio::spawn(pump_reader_to_writer(reader, target_writer));
            }
            Err(NetError::RouteNotFound) => {
                let _ = incoming.respond_route_not_found().await;
                let _ = incoming.close().await;
            }
            Err(error) => {
                tracing::debug!(reason = ?error, "query rejected");
                let _ = incoming.respond_rejected().await;
                let _ = incoming.close().await;
            }
        }
    }

    /// serve one inbound transit request once the `router` meta-service
    /// handler has accepted it
    ///
    /// the first frame off `rx` is the [`QueryParams`] control message;
    /// everything after it is raw payload for whatever route is found.
    async fn serve_transit_request(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Bytes>, caller_writer: Arc<Writer>) {
        let Some(first) = rx.recv().await else {
            return;
        };

        let params = match QueryParams::decode(first) {
            Ok(params) => params,
            Err(error) => {
                tracing::debug!(reason = ?error, "malformed transit request");
                let _ = caller_writer.close().await;
                return;
            }
        };

        // tolerate a certificate that expired up to CERT_SKEW ago: expiry
        // itself is a router-level policy, not the certificate's own concern
        let skewed_now = SystemTime::now().checked_sub(CERT_SKEW).unwrap_or(SystemTime::UNIX_EPOCH);
        let (caller, cert) = match &params.cert {
            Some(cert) if cert.subject() == &params.target && cert.verify(skewed_now).is_ok() => {
                (cert.issuer().clone(), cert.clone())
            }
            _ => {
                let _ = caller_writer.close().await;
                return;
            }
        };

        let query = Query::new(caller.clone(), params.target.clone(), params.name.clone(), Nonce::new(params.nonce), Origin::Network)
            .with_cert(cert);

        // the caller-direction writer is physically a substream to
        // whichever peer forwarded this request; assert the real caller
        // recovered from the certificate so the eventual handler sees
        // the end-to-end pair rather than the relay
        let translated_caller_writer = Arc::new(Writer::IdentityTranslation(IdentityTranslationWriter::new(
            caller_writer.clone(),
            caller,
        )));

        let target_writer = match self.route_query(query, translated_caller_writer).await {
            Ok(writer) => writer,
            Err(_) => {
                let _ = caller_writer.close().await;
                return;
            }
        };

        let response = QueryResponse {
            proxy_service: params.name,
            cert: None,
        };

        if caller_writer.write(response.encode()).await.is_err() {
            let _ = target_writer.close().await;
            return;
        }

        pump_channel_to_writer(rx, target_writer).await;
    }
}

/// the `router` meta-service: forwards a query to whatever route this
/// node would find for it, on behalf of whichever peer asked
///
/// registered under `(local_id, ROUTER_SERVICE_NAME)` by the node
/// layer; holds only a weak reference back so the registration itself
/// doesn't keep the router alive.
pub struct RouterService {
    router: Weak<Router>,
}

impl RouterService {
    pub fn new(router: &Arc<Router>) -> Self {
        Self {
            router: Arc::downgrade(router),
        }
    }
}

#[async_trait::async_trait]
impl Handler for RouterService {
    async fn open(&self, _query: Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        let router = self.router.upgrade().ok_or(NetError::LinkLost)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(router.serve_transit_request(rx, caller_writer));
        Ok(Arc::new(Writer::LocalService(LocalServiceWriter::new(tx))))
    }
}

/// the `reroute` meta-service: confirms whether this node is willing to
/// take over an in-flight query by nonce, the first step of [`Router::reroute`]
///
/// registered under `(local_id, REROUTE_SERVICE_NAME)` by the node
/// layer, alongside [`RouterService`].
pub struct RerouteService {
    router: Weak<Router>,
}

impl RerouteService {
    pub fn new(router: &Arc<Router>) -> Self {
        Self {
            router: Arc::downgrade(router),
        }
    }
}

#[async_trait::async_trait]
impl Handler for RerouteService {
    async fn open(&self, _query: Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        self.router.upgrade().ok_or(NetError::LinkLost)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(serve_reroute_request(rx, caller_writer));
        Ok(Arc::new(Writer::LocalService(LocalServiceWriter::new(tx))))
    }
}

/// answer a reroute confirmation request
///
/// the wire carries only the nonce being rerouted, nothing this node
/// could validate against a target or service name, so confirmation is
/// unconditional once the payload is well-formed.
async fn serve_reroute_request(mut rx: mpsc::UnboundedReceiver<Bytes>, caller_writer: Arc<Writer>) {
    let Some(first) = rx.recv().await else {
        return;
    };

    let status: u8 = if first.len() == 8 { 0 } else { 1 };
    let _ = caller_writer.write(Bytes::copy_from_slice(&[status])).await;
    let _ = caller_writer.close().await;
}

async fn pump_reader_to_writer(mut reader: SubstreamReader, writer: Arc<Writer>) {
    while let Some(chunk) = reader.next().await {
        match chunk {
            Ok(bytes) => {
                if writer.write(bytes).await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    let _ = writer.close().await;
}

async fn pump_channel_to_writer(mut rx: mpsc::UnboundedReceiver<Bytes>, writer: Arc<Writer>) {
    while let Some(bytes) = rx.recv().await {
        if writer.write(bytes).await.is_err() {
            break;
        }
    }
    let _ = writer.close().await;
}

async fn read_frame(reader: &mut SubstreamReader) -> Result<Bytes, NetError> {
    match reader.next().await {
        Some(Ok(bytes)) => Ok(bytes),
        Some(Err(error)) => Err(error),
        None => Err(NetError::LinkLost),
    }
}

async fn read_status_byte(reader: &mut SubstreamReader) -> Result<u8, NetError> {
    match reader.next().await {
        Some(Ok(bytes)) if !bytes.is_empty() => Ok(bytes[0]),
        Some(Ok(_)) => Err(NetError::ProtocolError("empty reroute status frame".into())),
        Some(Err(error)) => Err(error),
        None => Err(NetError::LinkLost),
    }
}

fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
