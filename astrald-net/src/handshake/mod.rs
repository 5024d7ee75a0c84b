/*!
# mutual authentication

performs the Noise **IK** handshake over a raw [`Transport`](crate::Transport):
the initiator already knows the responder's static public key, so the
exchange is two messages instead of three. the result is an authenticated
[`Handle`](crate::Handle) bound to the verified remote public key, with
forward-secret symmetric keys installed for both directions.

[Noise IK]: https://noiseexplorer.com/patterns/IK/
*/

mod accept;
mod open;
mod race;

pub use self::{accept::Accepting, open::Opening, race::race_outbound};
