mod certificate;
mod error;
mod identity;

pub use self::{
    certificate::Certificate,
    error::IdentityError,
    identity::{Fingerprint, Identity},
};

pub use keynesis::key::ed25519;
