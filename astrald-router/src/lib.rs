/*!
# astrald query router

this crate sits above [`astrald_net`] and decides what happens once two
nodes have a link: it tracks who is reachable ([`view`]), who is
listening for queries ([`services`]), and how a query gets from a
caller to a target ([`router`]), splicing the byte pumps that carry
its traffic ([`writer`]) along the way.

- [`view::PeerView`] is this node's live map of `identity -> links`,
  updated as links come up and go down.
- [`services::Registry`] is the `(identity, name) -> handler` table for
  services hosted locally.
- [`writer::Writer`] is the four-shape abstraction a routed query's
  response direction can take: a local handler's channel, a substream
  on a link, a reroutable splice point, or an identity assertion
  wrapped around one of the other three.
- [`router::Router`] ties the above together: given a [`query::Query`]
  and a writer for its response direction, it returns a writer for its
  request direction, trying local dispatch, then a direct link, then
  transit through another linked peer's own `router` service.
- [`events`] is the broadcast bus the rest of a node observes link,
  service, and query lifecycle through.
*/

pub mod error;
pub mod events;
pub mod query;
pub mod router;
pub mod services;
pub mod transit;
pub mod view;
pub mod writer;

pub use self::{
    error::RouterError,
    events::{Event, EventReceiver, EventSender},
    query::{Nonce, NonceGenerator, Origin, Query},
    router::{RerouteService, Router, RouterService, REROUTE_SERVICE_NAME, ROUTER_SERVICE_NAME},
    services::{Handler, Registration, Registry},
    view::PeerView,
    writer::Writer,
};
