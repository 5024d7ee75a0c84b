use crate::{
    mux::{Incoming, Mux, Substream, SubstreamReader, SubstreamWriter},
    Handle, NetError,
};
use astrald_identity::Identity;
use bytes::{BufMut as _, Bytes, BytesMut};
use futures::StreamExt as _;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::io::{AsyncRead, AsyncWrite};

const STATUS_ACCEPTED: u8 = 0;
const STATUS_REJECTED: u8 = 1;
const STATUS_ROUTE_NOT_FOUND: u8 = 2;

/// an authenticated channel plus its mux
///
/// exposes "open a substream for query Q" on the caller's side and
/// "accept incoming query" on the callee's side. `remote_id` is the
/// identity proven during the handshake that produced this link's
/// underlying [`Handle`].
pub struct Link {
    local_id: Identity,
    remote_id: Identity,
    mux: Mux,
    established_at: Instant,
    closed: Arc<AtomicBool>,
}

impl Link {
    pub fn new<I, O>(local_id: Identity, remote_id: Identity, handle: Handle<I, O>) -> (Self, IncomingQueries)
    where
        I: AsyncRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        let (mux, incoming) = Mux::new(*local_id.public_key(), handle);

        let link = Self {
            local_id,
            remote_id,
            mux,
            established_at: Instant::now(),
            closed: Arc::new(AtomicBool::new(false)),
        };

        (link, IncomingQueries(incoming))
    }

    pub fn local_id(&self) -> &Identity {
        &self.local_id
    }

    pub fn remote_id(&self) -> &Identity {
        &self.remote_id
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.mux.is_closed()
    }

    /// number of substreams currently open on this link
    pub fn substream_count(&self) -> usize {
        self.mux.substream_count()
    }

    /// fires once this link has fully torn down, explicitly or not
    pub fn watch_done(&self) -> tokio::sync::watch::Receiver<bool> {
        self.mux.watch_done()
    }

    /// open a query substream, carrying out the request side of §4.3
    ///
    /// `nonce` correlates this query across a transit hop and is
    /// assigned by the caller (the router), not by the link.
    pub async fn open_query(&self, nonce: u64, name: &str) -> Result<Substream, NetError> {
        if name.len() > 255 {
            return Err(NetError::InvalidArgument("query name longer than 255 bytes".into()));
        }

        let substream = self.mux.open()?;
        let (mut reader, writer) = substream.split();

        let mut header = BytesMut::with_capacity(8 + 1 + name.len());
        header.put_u64(nonce);
        header.put_u8(name.len() as u8);
        header.extend_from_slice(name.as_bytes());
        writer.write_all(header.freeze()).await?;

        match read_one_byte(&mut reader).await? {
            STATUS_ACCEPTED => Ok(Substream { reader, writer }),
            STATUS_REJECTED => {
                let _ = writer.close().await;
                Err(NetError::Rejected)
            }
            STATUS_ROUTE_NOT_FOUND => {
                let _ = writer.close().await;
                Err(NetError::RouteNotFound)
            }
            other => {
                let _ = writer.reset(0).await;
                Err(NetError::ProtocolError(format!(
                    "unexpected query status byte {}",
                    other
                )))
            }
        }
    }

    /// close the link: every live substream fails with `LinkLost`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.mux.close();
    }
}

/// a query header received on a freshly-opened inbound substream,
/// awaiting a routing decision
pub struct IncomingQuery {
    nonce: u64,
    name: String,
    reader: SubstreamReader,
    writer: SubstreamWriter,
}

impl IncomingQuery {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// send the accepted status byte without consuming the query
    ///
    /// a router composing the downstream write chain needs the status
    /// byte sent before it can hand the substream off as a duplex
    /// pipe; call [`into_substream`](Self::into_substream) afterward.
    pub async fn respond_accepted(&self) -> Result<(), NetError> {
        self.writer
            .write_all(Bytes::copy_from_slice(&[STATUS_ACCEPTED]))
            .await
    }

    pub async fn respond_rejected(&self) -> Result<(), NetError> {
        self.writer
            .write_all(Bytes::copy_from_slice(&[STATUS_REJECTED]))
            .await
    }

    pub async fn respond_route_not_found(&self) -> Result<(), NetError> {
        self.writer
            .write_all(Bytes::copy_from_slice(&[STATUS_ROUTE_NOT_FOUND]))
            .await
    }

    /// a cheap clone of the substream's send half
    ///
    /// routing a query needs a writer to wire into the downstream pump
    /// before it knows whether to accept, since the status byte is just
    /// the first thing written, not a precondition for writing at all.
    /// safe to call any number of times; every clone writes to the same
    /// underlying stream.
    pub fn writer(&self) -> SubstreamWriter {
        self.writer.clone()
    }

    /// turn the query into a full-duplex pipe after [`respond_accepted`](Self::respond_accepted)
    pub fn into_substream(self) -> Substream {
        Substream {
            reader: self.reader,
            writer: self.writer,
        }
    }

    /// consume the query for its receive half, once a response has
    /// already been sent and a writer already obtained via [`writer`](Self::writer)
    pub fn into_reader(self) -> SubstreamReader {
        self.reader
    }

    /// close the substream after a rejection or route-not-found response
    pub async fn close(self) -> Result<(), NetError> {
        self.writer.close().await
    }
}

/// the acceptor side of §4.3: pulls inbound substreams off the mux,
/// reads the query header from each, and yields routing decisions
pub struct IncomingQueries(Incoming);

impl IncomingQueries {
    /// wait for the next well-formed query header
    ///
    /// malformed headers are logged, their substream is reset, and the
    /// loop continues; `None` means the link itself has closed.
    pub async fn next_query(&mut self) -> Option<IncomingQuery> {
        loop {
            let substream = self.0.next().await?;
            let (mut reader, writer) = substream.split();

            match read_header(&mut reader).await {
                Ok((nonce, name)) => {
                    return Some(IncomingQuery {
                        nonce,
                        name,
                        reader,
                        writer,
                    })
                }
                Err(error) => {
                    tracing::debug!(reason = ?error, "malformed query header, dropping substream");
                    let _ = writer.reset(1).await;
                    continue;
                }
            }
        }
    }
}

async fn read_one_byte(reader: &mut SubstreamReader) -> Result<u8, NetError> {
    match reader.next().await {
        Some(Ok(bytes)) if !bytes.is_empty() => Ok(bytes[0]),
        Some(Ok(_)) => Err(NetError::ProtocolError("empty status frame".into())),
        Some(Err(error)) => Err(error),
        None => Err(NetError::LinkLost),
    }
}

async fn read_header(reader: &mut SubstreamReader) -> Result<(u64, String), NetError> {
    let bytes = match reader.next().await {
        Some(Ok(bytes)) => bytes,
        Some(Err(error)) => return Err(error),
        None => return Err(NetError::LinkLost),
    };

    if bytes.len() < 9 {
        return Err(NetError::ProtocolError("query header too short".into()));
    }

    let nonce = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let name_len = bytes[8] as usize;

    if bytes.len() != 9 + name_len {
        return Err(NetError::ProtocolError(
            "query header length does not match name_len".into(),
        ));
    }

    let name = std::str::from_utf8(&bytes[9..9 + name_len])
        .map_err(|_| NetError::ProtocolError("query name is not utf-8".into()))?
        .to_owned();

    Ok((nonce, name))
}
