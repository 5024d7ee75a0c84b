use crate::{
    events::{Event, EventSender},
    query::Query,
    writer::Writer,
};
use astrald_identity::Identity;
use astrald_net::NetError;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;

/// handles a query routed to a local service
///
/// given the query and the writer response bytes should flow into,
/// returns the writer request bytes should be forwarded to, or a
/// failure the router reports back to the caller.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn open(&self, query: Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError>;
}

#[async_trait::async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Query, Arc<Writer>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Arc<Writer>, NetError>> + Send,
{
    async fn open(&self, query: Query, caller_writer: Arc<Writer>) -> Result<Arc<Writer>, NetError> {
        (self)(query, caller_writer).await
    }
}

#[derive(Clone)]
struct Entry {
    handler: Arc<dyn Handler>,
    notify: Arc<Notify>,
}

/// process-wide `(identity, name) -> handler` table
///
/// lookup is exact-match only; the router is responsible for anything
/// resembling wildcard or service-discovery behavior.
pub struct Registry {
    handlers: Mutex<HashMap<(Identity, String), Entry>>,
    events: EventSender,
}

impl Registry {
    pub fn new(events: EventSender) -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// register a handler for `(identity, name)`
    ///
    /// fails with [`NetError::AlreadyRegistered`] if the key is taken.
    pub fn register(
        self: &Arc<Self>,
        identity: Identity,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<Registration, NetError> {
        let name = name.into();
        let key = (identity.clone(), name.clone());
        let notify = Arc::new(Notify::new());

        {
            let mut handlers = self.handlers.lock().unwrap();
            if handlers.contains_key(&key) {
                return Err(NetError::AlreadyRegistered);
            }
            handlers.insert(
                key.clone(),
                Entry {
                    handler,
                    notify: notify.clone(),
                },
            );
        }

        let _ = self.events.send(Event::ServiceRegistered {
            identity: identity.clone(),
            name: name.clone(),
        });

        Ok(Registration {
            registry: self.clone(),
            identity,
            name,
            notify,
            released: false,
        })
    }

    /// true if `identity` has a service bound under `name`
    pub fn has_handler(&self, identity: &Identity, name: &str) -> bool {
        self.handlers
            .lock()
            .unwrap()
            .contains_key(&(identity.clone(), name.to_owned()))
    }

    pub(crate) fn lookup(&self, identity: &Identity, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .lock()
            .unwrap()
            .get(&(identity.clone(), name.to_owned()))
            .map(|entry| entry.handler.clone())
    }

    fn deregister(&self, identity: &Identity, name: &str) {
        let removed = self
            .handlers
            .lock()
            .unwrap()
            .remove(&(identity.clone(), name.to_owned()));

        if let Some(entry) = removed {
            entry.notify.notify_waiters();
            let _ = self.events.send(Event::ServiceReleased {
                identity: identity.clone(),
                name: name.to_owned(),
            });
        }
    }
}

/// a live registration; dropping it deregisters the handler
pub struct Registration {
    registry: Arc<Registry>,
    identity: Identity,
    name: String,
    notify: Arc<Notify>,
    released: bool,
}

impl Registration {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// resolves once this registration has been deregistered, whether
    /// by [`deregister`](Self::deregister), by dropping, or by another
    /// party overwriting the same key
    pub async fn done(&self) {
        self.notify.notified().await
    }

    /// explicitly deregister; equivalent to dropping this handle
    pub fn deregister(mut self) {
        self.registry.deregister(&self.identity, &self.name);
        self.released = true;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.released {
            self.registry.deregister(&self.identity, &self.name);
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("identity", &self.identity)
            .field("name", &self.name)
            .finish()
    }
}
