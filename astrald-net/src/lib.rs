/*!
# astrald network protocol

this crate implements the wire-level half of an astrald node: two peers
perform a mutual [Noise Protocol IK] handshake to authenticate each
other and derive a shared transport key, then multiplex many
independent query streams ([`mux`]) over the single resulting
connection ([`link`]).

1. [`handshake`] runs the IK exchange over any [`transport::Transport`]
   and yields a [`Handle`] once both sides have proven their identity.
2. [`mux`] frames the handle's encrypted byte stream into
   [`Substream`](mux::Substream)s with their own flow control.
3. [`link::Link`] layers the query-open/accept protocol on top of the
   mux: a substream's first frame is always a query header, and the
   acceptor answers with a one-byte status before the substream becomes
   a plain duplex pipe.

[Noise Protocol IK]: https://noiseexplorer.com/patterns/IK/
*/

pub(crate) mod codec;
mod error;
mod handle;
pub mod handshake;
mod link;
pub mod mux;
mod session_id;
pub mod transport;
mod version;

pub use self::{
    error::NetError,
    handle::Handle,
    link::{IncomingQueries, IncomingQuery, Link},
    session_id::SessionId,
    transport::{Address, Transport},
    version::Version,
};
