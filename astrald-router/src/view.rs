use crate::events::{Event, EventSender};
use astrald_identity::{Fingerprint, Identity};
use astrald_net::Link;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

struct PeerEntry {
    identity: Identity,
    links: Vec<Arc<Link>>,
}

/// `identity -> links` map for every peer this node currently has or
/// has had a link to
///
/// a single mutex guards the whole map; no lock is ever held across an
/// `.await` point, so a watcher task spawned by [`add_link`](Self::add_link)
/// only ever touches the map from a freshly-acquired, short-lived guard.
pub struct PeerView {
    peers: Mutex<HashMap<Fingerprint, PeerEntry>>,
    events: EventSender,
}

impl PeerView {
    pub fn new(events: EventSender) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// register a newly-established link and spawn its done-signal watcher
    pub fn add_link(self: &Arc<Self>, link: Arc<Link>) {
        let identity = link.remote_id().clone();
        let fingerprint = identity.fingerprint();

        {
            let mut peers = self.peers.lock().unwrap();
            peers
                .entry(fingerprint)
                .or_insert_with(|| PeerEntry {
                    identity: identity.clone(),
                    links: Vec::new(),
                })
                .links
                .push(link.clone());
        }

        let _ = self.events.send(Event::LinkUp {
            identity: identity.clone(),
        });

        let view = self.clone();
        tokio::spawn(async move {
            let mut done = link.watch_done();
            let _ = done.wait_for(|done| *done).await;
            view.remove_link(&fingerprint, &link);
        });
    }

    fn remove_link(&self, fingerprint: &Fingerprint, link: &Arc<Link>) {
        let identity = {
            let mut peers = self.peers.lock().unwrap();
            let Some(entry) = peers.get_mut(fingerprint) else {
                return;
            };
            entry.links.retain(|l| !Arc::ptr_eq(l, link));
            let identity = entry.identity.clone();
            if entry.links.is_empty() {
                peers.remove(fingerprint);
            }
            identity
        };

        let _ = self.events.send(Event::LinkDown { identity });
    }

    /// a snapshot of the currently live links to `identity`
    pub fn links_by_identity(&self, identity: &Identity) -> Vec<Arc<Link>> {
        self.peers
            .lock()
            .unwrap()
            .get(&identity.fingerprint())
            .map(|entry| entry.links.clone())
            .unwrap_or_default()
    }

    /// the link to `identity` with the fewest in-flight substreams,
    /// ties broken by earliest `established_at`
    pub fn best_link(&self, identity: &Identity) -> Option<Arc<Link>> {
        let links = self.links_by_identity(identity);

        links.into_iter().min_by(|a, b| {
            a.substream_count()
                .cmp(&b.substream_count())
                .then(a.established_at().cmp(&b.established_at()))
        })
    }

    /// true if the view currently holds any link to `identity`
    pub fn has_link(&self, identity: &Identity) -> bool {
        self.peers.lock().unwrap().contains_key(&identity.fingerprint())
    }

    /// every identity this node currently has a live link to
    pub fn known_identities(&self) -> Vec<Identity> {
        self.peers
            .lock()
            .unwrap()
            .values()
            .map(|entry| entry.identity.clone())
            .collect()
    }
}
