use astrald_identity::{Certificate, Identity};
use rand_core::{CryptoRng, RngCore};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// 64-bit identifier correlating a query across its lifetime
///
/// used to find the active connection again for a reroute; uniqueness
/// only needs to hold among this node's currently active queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nonce(u64);

impl Nonce {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// issues nonces for queries originated by this node
///
/// seeded from an RNG rather than starting at zero so that nonces from
/// one run of the node aren't observably reused after a restart.
pub struct NonceGenerator {
    counter: AtomicU64,
}

impl NonceGenerator {
    pub fn new<RNG>(rng: &mut RNG) -> Self
    where
        RNG: RngCore + CryptoRng,
    {
        Self {
            counter: AtomicU64::new(rng.next_u64()),
        }
    }

    pub fn next(&self) -> Nonce {
        Nonce(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// where a query's caller sits relative to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// the caller is a service registered on this node
    Local,
    /// the caller reached this node over a link
    Network,
}

/// a request to open a substream from `caller` to `target` named `name`
#[derive(Debug, Clone)]
pub struct Query {
    pub caller: Identity,
    pub target: Identity,
    pub name: String,
    pub nonce: Nonce,
    pub origin: Origin,
    /// a certificate already proving `caller`'s identity to whatever
    /// receives this query next, carried across relay hops without
    /// re-signing
    pub cert: Option<Certificate>,
}

impl Query {
    pub fn new(caller: Identity, target: Identity, name: impl Into<String>, nonce: Nonce, origin: Origin) -> Self {
        Self {
            caller,
            target,
            name: name.into(),
            nonce,
            origin,
            cert: None,
        }
    }

    /// attach a certificate already proving `caller`'s identity, so a
    /// node relaying this query further can forward it instead of
    /// signing a fresh one
    pub fn with_cert(mut self, cert: Certificate) -> Self {
        self.cert = Some(cert);
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({}) [{}]", self.caller, self.target, self.name, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn generator_never_repeats_within_a_run() {
        let mut rng = OsRng;
        let generator = NonceGenerator::new(&mut rng);

        let a = generator.next();
        let b = generator.next();
        let c = generator.next();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(b.get(), a.get().wrapping_add(1));
    }

    #[test]
    fn nonce_display_is_fixed_width_hex() {
        assert_eq!(Nonce::new(0).to_string(), "0000000000000000");
        assert_eq!(Nonce::new(255).to_string(), "00000000000000ff");
    }
}
