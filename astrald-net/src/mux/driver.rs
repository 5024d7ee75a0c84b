use super::{stream::IncomingEvent, MuxShared, Substream};
use crate::{codec::mux::MuxFrame, handle::Handle};
use futures::{SinkExt as _, StreamExt as _};
use std::sync::{atomic::Ordering, Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

/// the mux's single background task
///
/// owns both halves of the underlying [`Handle`] so that reads,
/// writes and frame bookkeeping never race with each other; every
/// other operation on the mux communicates with this task through
/// channels.
pub(super) async fn run<I, O>(
    shared: Arc<MuxShared>,
    handle: Handle<I, O>,
    mut outbound_rx: mpsc::UnboundedReceiver<MuxFrame>,
    accept_tx: mpsc::UnboundedSender<Substream>,
) where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = handle.split();

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            incoming = reader.next() => {
                match incoming {
                    None => break,
                    Some(Err(error)) => {
                        tracing::debug!(reason = ?error, "link read error");
                        break;
                    }
                    Some(Ok(bytes)) => {
                        match MuxFrame::decode(&bytes) {
                            Ok(frame) => {
                                if !handle_incoming(&shared, &accept_tx, frame) {
                                    tracing::debug!("fatal mux frame, closing link");
                                    break;
                                }
                            }
                            Err(error) => {
                                tracing::debug!(reason = ?error, "malformed mux frame");
                                break;
                            }
                        }
                    }
                }
            }
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    None => break,
                    Some(frame) => {
                        let bytes = frame.encode().freeze();
                        if writer.send(bytes).await.is_err() {
                            tracing::debug!("link write error");
                            break;
                        }
                    }
                }
            }
        }
    }

    shared.cancel.cancel();
    shared.closed.store(true, Ordering::SeqCst);

    let stragglers: Vec<_> = shared.streams.lock().unwrap().drain().collect();
    for (_, entry) in stragglers {
        let _ = entry.incoming.send(IncomingEvent::LinkLost);
    }

    let _ = writer.close().await;
    let _ = shared.done_tx.send(true);
}

fn handle_incoming(
    shared: &Arc<MuxShared>,
    accept_tx: &mpsc::UnboundedSender<Substream>,
    frame: MuxFrame,
) -> bool {
    match frame {
        MuxFrame::Open { stream_id } => match shared.register_remote(stream_id) {
            Some(substream) => {
                if accept_tx.send(substream).is_err() {
                    tracing::debug!(stream_id, "no acceptor listening, dropping inbound substream");
                    shared.forget_stream(stream_id);
                }
                true
            }
            None => false,
        },
        MuxFrame::Data {
            stream_id,
            payload,
        } => {
            if !shared.charge_recv_window(stream_id, payload.len() as u32) {
                tracing::debug!(stream_id, "peer exceeded its receive window, dropping link");
                return false;
            }
            deliver(shared, stream_id, IncomingEvent::Data(payload))
        }
        MuxFrame::Ack {
            stream_id,
            bytes_freed,
        } => {
            let streams = shared.streams.lock().unwrap();
            match streams.get(&stream_id) {
                Some(entry) => {
                    entry.send_window.add_permits(bytes_freed as usize);
                    true
                }
                None => false,
            }
        }
        MuxFrame::Close { stream_id } => deliver(shared, stream_id, IncomingEvent::Closed),
        MuxFrame::Reset { stream_id, code } => {
            deliver(shared, stream_id, IncomingEvent::Reset(code))
        }
    }
}

fn deliver(shared: &Arc<MuxShared>, stream_id: u16, event: IncomingEvent) -> bool {
    let streams = shared.streams.lock().unwrap();
    match streams.get(&stream_id) {
        Some(entry) => {
            let _ = entry.incoming.send(event);
            true
        }
        None => false,
    }
}
