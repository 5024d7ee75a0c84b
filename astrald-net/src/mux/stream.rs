use super::MuxShared;
use crate::{codec::mux::MuxFrame, NetError};
use bytes::Bytes;
use futures::Stream;
use std::{
    pin::Pin,
    sync::{atomic::AtomicU32, Arc},
    task::{Context, Poll},
};
use tokio::sync::{mpsc, Semaphore};

/// bytes delivered to a substream's reader by the mux driver
pub(super) enum IncomingEvent {
    Data(Bytes),
    Closed,
    Reset(u8),
    LinkLost,
}

/// per-stream bookkeeping the driver needs: where to deliver incoming
/// frames, and how much send window the peer has granted us
pub(super) struct StreamEntry {
    pub(super) incoming: mpsc::UnboundedSender<IncomingEvent>,
    pub(super) send_window: Arc<Semaphore>,
    pub(super) recv_outstanding: AtomicU32,
}

/// a single bidirectional channel inside a [`Mux`](super::Mux)
///
/// ordering is preserved within a substream; there is no ordering
/// guarantee between two different substreams on the same link.
pub struct Substream {
    pub reader: SubstreamReader,
    pub writer: SubstreamWriter,
}

impl Substream {
    pub fn stream_id(&self) -> u16 {
        self.writer.stream_id
    }

    pub fn split(self) -> (SubstreamReader, SubstreamWriter) {
        (self.reader, self.writer)
    }
}

/// the receive half of a [`Substream`]
///
/// yields the payload of each `data` frame in order; acks are sent
/// back to the peer in coalesced batches once enough bytes have been
/// drained rather than one ack per frame.
pub struct SubstreamReader {
    pub(super) stream_id: u16,
    pub(super) shared: Arc<MuxShared>,
    pub(super) rx: mpsc::UnboundedReceiver<IncomingEvent>,
    pub(super) unacked: u32,
    pub(super) done: bool,
}

const ACK_THRESHOLD: u32 = super::DEFAULT_WINDOW / 4;

impl Stream for SubstreamReader {
    type Item = Result<Bytes, NetError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(IncomingEvent::Data(bytes))) => {
                this.unacked = this.unacked.saturating_add(bytes.len() as u32);
                if this.unacked >= ACK_THRESHOLD {
                    let freed = this.unacked;
                    this.unacked = 0;
                    let _ = this.shared.send_frame(MuxFrame::Ack {
                        stream_id: this.stream_id,
                        bytes_freed: freed,
                    });
                    this.shared.release_recv_window(this.stream_id, freed);
                }
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(IncomingEvent::Closed)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(IncomingEvent::Reset(code))) => {
                this.done = true;
                Poll::Ready(Some(Err(NetError::ProtocolError(format!(
                    "substream reset by peer (code {})",
                    code
                )))))
            }
            Poll::Ready(Some(IncomingEvent::LinkLost)) => {
                this.done = true;
                Poll::Ready(Some(Err(NetError::LinkLost)))
            }
        }
    }
}

impl Drop for SubstreamReader {
    fn drop(&mut self) {
        self.shared.forget_stream(self.stream_id);
    }
}

/// the send half of a [`Substream`]
///
/// writes chunk themselves to at most the wire's max frame payload and
/// block (via a per-stream semaphore fed by incoming `ack` frames)
/// until the peer's receive window has room.
#[derive(Clone)]
pub struct SubstreamWriter {
    pub(super) stream_id: u16,
    pub(super) shared: Arc<MuxShared>,
    pub(super) send_window: Arc<Semaphore>,
}

/// largest payload written to the wire per `data` frame; also the unit
/// of round-robin fairness between substreams sharing one link, since
/// no stream can monopolize the outbound channel for longer than it
/// takes to send one chunk.
pub const MAX_CHUNK: usize = 16 * 1024;

impl SubstreamWriter {
    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }

    /// write `payload`, blocking until the peer's window admits it
    ///
    /// returns [`NetError::Cancelled`] if the link closes while this
    /// call is waiting on window.
    pub async fn write_all(&self, payload: Bytes) -> Result<(), NetError> {
        let mut offset = 0;
        while offset < payload.len() {
            let end = (offset + MAX_CHUNK).min(payload.len());
            let chunk = payload.slice(offset..end);
            self.write_chunk(chunk).await?;
            offset = end;
        }
        Ok(())
    }

    async fn write_chunk(&self, chunk: Bytes) -> Result<(), NetError> {
        let permits = chunk.len() as u32;

        let acquire = self.send_window.acquire_many(permits.max(1));
        tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => {
                let _ = self.shared.send_frame(MuxFrame::Reset {
                    stream_id: self.stream_id,
                    code: 0,
                });
                return Err(NetError::Cancelled);
            }
            permit = acquire => {
                let permit = permit.map_err(|_| NetError::LinkLost)?;
                permit.forget();
            }
        }

        self.shared.send_frame(MuxFrame::Data {
            stream_id: self.stream_id,
            payload: chunk,
        })
    }

    /// close this substream's send direction; the peer sees end-of-stream
    pub async fn close(&self) -> Result<(), NetError> {
        self.shared.send_frame(MuxFrame::Close {
            stream_id: self.stream_id,
        })
    }

    /// abort this substream; the peer's reader observes a reset error
    pub async fn reset(&self, code: u8) -> Result<(), NetError> {
        self.shared.send_frame(MuxFrame::Reset {
            stream_id: self.stream_id,
            code,
        })
    }
}
