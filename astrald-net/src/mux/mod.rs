/*!
# stream multiplexer

runs on top of one authenticated [`Handle`](crate::Handle) and carries
many independent, bidirectional [`Substream`]s. Frames are defined in
[`crate::codec::mux`]; this module owns stream id allocation, the
per-stream receive window, and the single background task ("the
driver") that serializes reads and writes onto the underlying link.

A malformed or unexpected frame is fatal for the whole mux: every live
substream observes [`NetError::LinkLost`] and the underlying connection
is closed exactly once, by the driver task tearing itself down.
*/

mod driver;
mod stream;

pub use self::stream::{Substream, SubstreamReader, SubstreamWriter, MAX_CHUNK};

use crate::{codec::mux::MuxFrame, handle::Handle, NetError};
use keynesis::key::ed25519::PublicKey;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering},
        Arc, Mutex,
    },
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, watch, Semaphore},
};
use tokio_util::sync::CancellationToken;

/// default per-substream receive window, in bytes
pub const DEFAULT_WINDOW: u32 = 64 * 1024;

/// the half of the 16-bit stream id space a side may allocate from
///
/// ids are split by a single bit so that both peers can open
/// substreams concurrently without colliding: whichever identity
/// sorts first (by public key bytes) allocates from the low half.
fn side_bit(local: &PublicKey, remote: &PublicKey) -> u16 {
    if local.as_ref() <= remote.as_ref() {
        0x0000
    } else {
        0x8000
    }
}

pub(crate) struct MuxShared {
    streams: Mutex<HashMap<u16, stream::StreamEntry>>,
    next_id: AtomicU16,
    side_bit: u16,
    outbound_tx: mpsc::UnboundedSender<MuxFrame>,
    cancel: CancellationToken,
    closed: AtomicBool,
    done_tx: watch::Sender<bool>,
}

impl MuxShared {
    pub(crate) fn send_frame(&self, frame: MuxFrame) -> Result<(), NetError> {
        self.outbound_tx
            .send(frame)
            .map_err(|_| NetError::LinkLost)
    }

    pub(crate) fn forget_stream(&self, stream_id: u16) {
        self.streams.lock().unwrap().remove(&stream_id);
    }

    /// account for `len` freshly arrived bytes on `stream_id`'s receive
    /// window; returns `false` if the peer has now sent more than
    /// [`DEFAULT_WINDOW`] bytes without having them acked, which the
    /// driver treats as a fatal protocol violation
    pub(crate) fn charge_recv_window(&self, stream_id: u16, len: u32) -> bool {
        match self.streams.lock().unwrap().get(&stream_id) {
            Some(entry) => entry.recv_outstanding.fetch_add(len, Ordering::SeqCst) + len <= DEFAULT_WINDOW,
            None => true,
        }
    }

    /// release `freed` bytes of receive window on `stream_id`, called
    /// once an `ack` frame covering them has gone out
    pub(crate) fn release_recv_window(&self, stream_id: u16, freed: u32) {
        if let Some(entry) = self.streams.lock().unwrap().get(&stream_id) {
            entry.recv_outstanding.fetch_sub(freed, Ordering::SeqCst);
        }
    }

    /// register a substream for an id the *remote* picked (inbound `open`)
    ///
    /// returns `None` if the id is already in use, which the driver
    /// treats as a fatal protocol violation.
    pub(crate) fn register_remote(self: &Arc<Self>, stream_id: u16) -> Option<Substream> {
        let mut streams = self.streams.lock().unwrap();
        if streams.contains_key(&stream_id) {
            return None;
        }
        Some(Self::insert_and_build(self, &mut streams, stream_id))
    }

    fn insert_and_build(
        shared: &Arc<Self>,
        streams: &mut HashMap<u16, stream::StreamEntry>,
        stream_id: u16,
    ) -> Substream {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let send_window = Arc::new(Semaphore::new(DEFAULT_WINDOW as usize));

        streams.insert(
            stream_id,
            stream::StreamEntry {
                incoming: incoming_tx,
                send_window: send_window.clone(),
                recv_outstanding: AtomicU32::new(0),
            },
        );

        Substream {
            reader: stream::SubstreamReader {
                stream_id,
                shared: shared.clone(),
                rx: incoming_rx,
                unacked: 0,
                done: false,
            },
            writer: SubstreamWriter {
                stream_id,
                shared: shared.clone(),
                send_window,
            },
        }
    }
}

/// a handle to a running mux
///
/// cheap to clone; all clones share the same driver task and stream
/// table.
#[derive(Clone)]
pub struct Mux {
    shared: Arc<MuxShared>,
}

/// incoming substreams opened by the remote peer
pub struct Incoming(mpsc::UnboundedReceiver<Substream>);

impl futures::Stream for Incoming {
    type Item = Substream;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

impl Mux {
    /// start the mux driver over an authenticated handle
    ///
    /// `local_public` is this node's own identity, used only to decide
    /// which half of the stream id space this side allocates from.
    pub fn new<I, O>(local_public: PublicKey, handle: Handle<I, O>) -> (Self, Incoming)
    where
        I: AsyncRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        let remote_public = *handle.remote_public_identity();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();

        let (done_tx, _done_rx) = watch::channel(false);

        let shared = Arc::new(MuxShared {
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU16::new(1),
            side_bit: side_bit(&local_public, &remote_public),
            outbound_tx,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            done_tx,
        });

        tokio::spawn(driver::run(shared.clone(), handle, outbound_rx, accept_tx));

        (Mux { shared }, Incoming(accept_rx))
    }

    /// open a new substream to the peer
    ///
    /// fails with [`NetError::NoStreamIds`] if this side's half of the
    /// id space is exhausted (32768 concurrently live substreams).
    pub fn open(&self) -> Result<Substream, NetError> {
        if self.is_closed() {
            return Err(NetError::LinkLost);
        }

        let mut streams = self.shared.streams.lock().unwrap();

        for _ in 0..0x8000u32 {
            let candidate = self.shared.next_id.fetch_add(1, Ordering::Relaxed) & 0x7fff;
            let stream_id = candidate | self.shared.side_bit;

            if candidate == 0 || streams.contains_key(&stream_id) {
                continue;
            }

            let substream = MuxShared::insert_and_build(&self.shared, &mut streams, stream_id);
            drop(streams);

            self.shared.send_frame(MuxFrame::Open { stream_id })?;
            return Ok(substream);
        }

        Err(NetError::NoStreamIds)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// how many substreams are currently live on this mux
    pub fn substream_count(&self) -> usize {
        self.shared.streams.lock().unwrap().len()
    }

    /// subscribe to the mux's teardown: fires once the driver task has
    /// exited, whether from an explicit [`close`](Self::close) or a
    /// fatal protocol error / IO failure
    pub fn watch_done(&self) -> watch::Receiver<bool> {
        self.shared.done_tx.subscribe()
    }

    /// close the whole link: every live substream fails with `LinkLost`
    /// and the underlying connection is closed
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }
}
