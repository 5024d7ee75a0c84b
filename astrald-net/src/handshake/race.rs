use crate::{transport::tcp, Handle, NetError};
use futures::stream::{FuturesUnordered, StreamExt as _};
use keynesis::key::{ed25519::PublicKey, Dh};
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// race a handshake against several candidate addresses for the same peer
///
/// a node may be reachable at more than one address; rather than trying
/// them one at a time, up to `workers` are attempted concurrently and
/// the first successful handshake wins. the rest are left to resolve
/// and are simply dropped.
pub async fn race_outbound<K>(
    k: &K,
    expected_remote: PublicKey,
    candidates: Vec<SocketAddr>,
    workers: usize,
) -> Result<Handle<OwnedReadHalf, OwnedWriteHalf>, NetError>
where
    K: Dh,
{
    if candidates.is_empty() {
        return Err(NetError::RouteNotFound);
    }

    let workers = workers.max(1);
    let mut pending = candidates.into_iter();
    let mut attempts = FuturesUnordered::new();

    for addr in pending.by_ref().take(workers) {
        attempts.push(try_handshake(k, expected_remote, addr));
    }

    let mut last_error = None;
    while let Some(result) = attempts.next().await {
        match result {
            Ok(handle) => return Ok(handle),
            Err(error) => {
                tracing::debug!(reason = ?error, "candidate handshake failed");
                last_error = Some(error);
                if let Some(addr) = pending.next() {
                    attempts.push(try_handshake(k, expected_remote, addr));
                }
            }
        }
    }

    Err(last_error.unwrap_or(NetError::RouteNotFound))
}

async fn try_handshake<K>(
    k: &K,
    expected_remote: PublicKey,
    addr: SocketAddr,
) -> Result<Handle<OwnedReadHalf, OwnedWriteHalf>, NetError>
where
    K: Dh,
{
    let stream = tcp::connect(addr)
        .await
        .map_err(NetError::HandshakeFailed)?;
    let (reader, writer) = stream.into_split();

    Handle::open(rand::rngs::OsRng, k, expected_remote, reader, writer)
        .await
        .map_err(NetError::HandshakeFailed)
}
