//! exercises a direct two-node query over an in-process duplex transport,
//! standing in for a real TCP link the way the rest of the tokio ecosystem
//! tests async network code without sockets.

use astrald_identity::Identity;
use astrald_net::{Handle, Link};
use astrald_router::{
    events, query::Origin, writer::LocalServiceWriter, Handler, Nonce, NonceGenerator, PeerView, Query, Registry,
    Router, Writer,
};
use bytes::Bytes;
use rand::rngs::OsRng;
use std::sync::Arc;
use tokio::sync::mpsc;

struct EchoHandler;

#[async_trait::async_trait]
impl Handler for EchoHandler {
    async fn open(&self, _query: Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, astrald_net::NetError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if caller_writer.write(chunk).await.is_err() {
                    break;
                }
            }
            let _ = caller_writer.close().await;
        });
        Ok(Arc::new(Writer::LocalService(LocalServiceWriter::new(tx))))
    }
}

#[tokio::test]
async fn a_direct_query_reaches_a_remote_services_handler_and_echoes_back() {
    let a_id = Identity::generate(OsRng);
    let b_id = Identity::generate(OsRng);

    let (a_stream, b_stream) = tokio::io::duplex(64 * 1024);
    let (a_reader, a_writer) = tokio::io::split(a_stream);
    let (b_reader, b_writer) = tokio::io::split(b_stream);

    let b_public = *b_id.public_key();

    let (handle_a, handle_b) = tokio::try_join!(
        async {
            let a_secret = a_id.secret_key().unwrap();
            Handle::open(OsRng, a_secret, b_public, a_reader, a_writer).await
        },
        async {
            let b_secret = b_id.secret_key().unwrap();
            Handle::accept(OsRng, b_reader, b_writer).accept(b_secret, |_remote| true).await
        }
    )
    .expect("handshake succeeds");

    let (link_a, _incoming_a) = Link::new(a_id.clone(), b_id.clone(), handle_a);
    let (link_b, incoming_b) = Link::new(b_id.clone(), a_id.clone(), handle_b);
    let link_a = Arc::new(link_a);
    let link_b = Arc::new(link_b);

    let (events_b, _events_b_rx) = events::channel(events::DEFAULT_CAPACITY);
    let view_b = Arc::new(PeerView::new(events_b.clone()));
    let services_b = Arc::new(Registry::new(events_b.clone()));
    services_b
        .register(b_id.clone(), "echo", Arc::new(EchoHandler))
        .expect("registers echo service");
    let router_b = Router::new(b_id.clone(), view_b, services_b, events_b, NonceGenerator::new(&mut OsRng));
    router_b.serve_incoming(link_b, incoming_b);

    let (events_a, _events_a_rx) = events::channel(events::DEFAULT_CAPACITY);
    let view_a = Arc::new(PeerView::new(events_a.clone()));
    view_a.add_link(link_a);
    let services_a = Arc::new(Registry::new(events_a.clone()));
    let router_a = Router::new(a_id.clone(), view_a, services_a, events_a, NonceGenerator::new(&mut OsRng));

    let (caller_tx, mut caller_rx) = mpsc::unbounded_channel::<Bytes>();
    let caller_writer = Arc::new(Writer::LocalService(LocalServiceWriter::new(caller_tx)));

    let query = Query::new(a_id.clone(), b_id.clone(), "echo", Nonce::new(1), Origin::Local);
    let target_writer = router_a
        .route_query(query, caller_writer)
        .await
        .expect("direct route to b is found");

    target_writer.write(Bytes::from_static(b"ping")).await.unwrap();

    let echoed = caller_rx.recv().await.expect("echo arrives back at the caller");
    assert_eq!(echoed, Bytes::from_static(b"ping"));
}

#[tokio::test]
async fn a_query_for_an_unregistered_service_is_route_not_found() {
    let a_id = Identity::generate(OsRng);
    let b_id = Identity::generate(OsRng);

    let (a_stream, b_stream) = tokio::io::duplex(64 * 1024);
    let (a_reader, a_writer) = tokio::io::split(a_stream);
    let (b_reader, b_writer) = tokio::io::split(b_stream);

    let b_public = *b_id.public_key();

    let (handle_a, handle_b) = tokio::try_join!(
        async {
            let a_secret = a_id.secret_key().unwrap();
            Handle::open(OsRng, a_secret, b_public, a_reader, a_writer).await
        },
        async {
            let b_secret = b_id.secret_key().unwrap();
            Handle::accept(OsRng, b_reader, b_writer).accept(b_secret, |_remote| true).await
        }
    )
    .expect("handshake succeeds");

    let (link_a, _incoming_a) = Link::new(a_id.clone(), b_id.clone(), handle_a);
    let (link_b, incoming_b) = Link::new(b_id.clone(), a_id.clone(), handle_b);
    let link_a = Arc::new(link_a);

    let (events_b, _events_b_rx) = events::channel(events::DEFAULT_CAPACITY);
    let view_b = Arc::new(PeerView::new(events_b.clone()));
    let services_b = Arc::new(Registry::new(events_b.clone()));
    let router_b = Router::new(b_id.clone(), view_b, services_b, events_b, NonceGenerator::new(&mut OsRng));
    router_b.serve_incoming(Arc::new(link_b), incoming_b);

    let (events_a, _events_a_rx) = events::channel(events::DEFAULT_CAPACITY);
    let view_a = Arc::new(PeerView::new(events_a.clone()));
    view_a.add_link(link_a);
    let services_a = Arc::new(Registry::new(events_a.clone()));
    let router_a = Router::new(a_id.clone(), view_a, services_a, events_a, NonceGenerator::new(&mut OsRng));

    let (caller_tx, _caller_rx) = mpsc::unbounded_channel::<Bytes>();
    let caller_writer = Arc::new(Writer::LocalService(LocalServiceWriter::new(caller_tx)));

    let query = Query::new(a_id.clone(), b_id.clone(), "nonexistent", Nonce::new(2), Origin::Local);
    let result = router_a.route_query(query, caller_writer).await;

    assert!(matches!(result, Err(astrald_net::NetError::RouteNotFound)));
}
