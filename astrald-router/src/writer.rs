use astrald_identity::Identity;
use astrald_net::{mux::SubstreamWriter, NetError};
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{mpsc, Mutex};

/// one link in a routed byte chain
///
/// a `Query` is answered with a `target_writer`: something further
/// request bytes get written into. the four variants are the only
/// shapes a link in that chain can take.
pub enum Writer {
    /// the final hop is a handler running in this process
    LocalService(LocalServiceWriter),
    /// the final hop is a substream on a link to another node
    LinkSubstream(SubstreamWriter),
    /// a reroute splice point: writes go to whichever output is
    /// currently active
    Switch(SwitchWriter),
    /// wraps another writer, asserting a different identity to
    /// downstream consumers than the physical writer's own
    IdentityTranslation(IdentityTranslationWriter),
}

impl Writer {
    pub async fn write(&self, data: Bytes) -> Result<(), NetError> {
        match self {
            Writer::LocalService(w) => w.write(data).await,
            Writer::LinkSubstream(w) => w.write_all(data).await,
            Writer::Switch(w) => w.write(data).await,
            Writer::IdentityTranslation(w) => w.inner.write(data).await,
        }
    }

    pub async fn close(&self) -> Result<(), NetError> {
        match self {
            Writer::LocalService(w) => w.close().await,
            Writer::LinkSubstream(w) => w.close().await,
            Writer::Switch(w) => w.close().await,
            Writer::IdentityTranslation(w) => w.inner.close().await,
        }
    }

    /// the identity this writer presents to whatever reads from it
    pub fn stated_identity<'a>(&'a self, physical: &'a Identity) -> &'a Identity {
        match self {
            Writer::IdentityTranslation(w) => &w.asserted,
            _ => physical,
        }
    }

    /// splice a new output into this writer's active output, if it is
    /// a [`Writer::Switch`]; returns the output it replaced
    ///
    /// `None` if this writer isn't a switch point at all, which means
    /// whatever holds it asked for a reroute on a query that was never
    /// wired to be reroutable.
    pub async fn reroute(&self, new_output: Arc<Writer>) -> Option<Arc<Writer>> {
        match self {
            Writer::Switch(switch) => Some(switch.commit(new_output).await),
            _ => None,
        }
    }
}

/// forwards bytes to a local service's inbound channel
///
/// closing drops the sender, which the receiving handler observes as
/// a `None` from its channel — the same end-of-stream signal a remote
/// substream's reader would see.
pub struct LocalServiceWriter {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl LocalServiceWriter {
    pub fn new(tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    async fn write(&self, data: Bytes) -> Result<(), NetError> {
        match self.tx.lock().await.as_ref() {
            Some(tx) => tx.send(data).map_err(|_| NetError::LinkLost),
            None => Err(NetError::LinkLost),
        }
    }

    async fn close(&self) -> Result<(), NetError> {
        *self.tx.lock().await = None;
        Ok(())
    }
}

/// wraps another writer, asserting `asserted` as its identity to
/// downstream consumers regardless of the physical peer's own
pub struct IdentityTranslationWriter {
    inner: Arc<Writer>,
    asserted: Identity,
}

impl IdentityTranslationWriter {
    pub fn new(inner: Arc<Writer>, asserted: Identity) -> Self {
        Self { inner, asserted }
    }
}

/// a reroute splice point
///
/// writes and closes go to whichever output is currently active;
/// [`commit`](Self::commit) swaps the active output under the same
/// lock writes take, so a write already in flight completes on the
/// old output before any write observes the new one.
pub struct SwitchWriter {
    active: Mutex<Arc<Writer>>,
    committed: AtomicBool,
}

impl SwitchWriter {
    pub fn new(initial: Arc<Writer>) -> Self {
        Self {
            active: Mutex::new(initial),
            committed: AtomicBool::new(false),
        }
    }

    pub async fn write(&self, data: Bytes) -> Result<(), NetError> {
        let active = self.active.lock().await;
        active.write(data).await
    }

    pub async fn close(&self) -> Result<(), NetError> {
        let active = self.active.lock().await;
        active.close().await
    }

    /// switch the active output, returning the one it replaced
    ///
    /// any write already holding the lock finishes first, any write
    /// after this call sees `new_output`. the caller is responsible
    /// for closing the returned writer.
    pub async fn commit(&self, new_output: Arc<Writer>) -> Arc<Writer> {
        let mut active = self.active.lock().await;
        self.committed.store(true, Ordering::SeqCst);
        std::mem::replace(&mut *active, new_output)
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn local_service() -> (Arc<Writer>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = unbounded_channel();
        (Arc::new(Writer::LocalService(LocalServiceWriter::new(tx))), rx)
    }

    #[tokio::test]
    async fn switch_writes_go_to_the_active_output() {
        let (first, mut first_rx) = local_service();
        let switch = Arc::new(Writer::Switch(SwitchWriter::new(first)));

        switch.write(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(first_rx.recv().await.unwrap(), Bytes::from_static(b"hello"));

        let (second, mut second_rx) = local_service();
        let replaced = switch.reroute(second).await.unwrap();
        replaced.close().await.unwrap();

        switch.write(Bytes::from_static(b"world")).await.unwrap();
        assert_eq!(second_rx.recv().await.unwrap(), Bytes::from_static(b"world"));
        assert!(first_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn reroute_on_a_non_switch_writer_is_a_no_op() {
        let (writer, _rx) = local_service();
        assert!(writer.reroute(Arc::new(Writer::Switch(SwitchWriter::new(writer.clone())))).await.is_none());
    }

    #[tokio::test]
    async fn commit_marks_the_switch_as_committed() {
        let (first, _rx1) = local_service();
        let switch = SwitchWriter::new(first);
        assert!(!switch.is_committed());

        let (second, _rx2) = local_service();
        switch.commit(second).await;
        assert!(switch.is_committed());
    }

    #[tokio::test]
    async fn closing_a_local_service_writer_ends_the_channel() {
        let (writer, mut rx) = local_service();
        writer.close().await.unwrap();
        assert!(rx.recv().await.is_none());
        assert!(writer.write(Bytes::from_static(b"too late")).await.is_err());
    }
}
