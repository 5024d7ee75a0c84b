use crate::IdentityError;
use keynesis::key::ed25519::{self, PublicKey, SecretKey};
use rand_core::{CryptoRng, RngCore};
use std::{
    convert::TryFrom,
    fmt::{self, Formatter},
    str::FromStr,
};

/// fingerprint of a [`PublicKey`], used in logs and tracker entries
///
/// this is the first 16 bytes of a Blake2b hash of the public key,
/// rendered as hex: short enough to log, long enough to not collide
/// by accident.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct Fingerprint([u8; Self::SIZE]);

impl Fingerprint {
    pub const SIZE: usize = 16;

    fn of(public: &PublicKey) -> Self {
        use keynesis::hash::Blake2b;

        let mut hash = [0; 32];
        Blake2b::blake2b(&mut hash, public.as_ref(), &[]);

        let mut fingerprint = [0; Self::SIZE];
        fingerprint.copy_from_slice(&hash[..Self::SIZE]);
        Self(fingerprint)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fingerprint")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

/// an astrald node's identity: an ed25519 keypair
///
/// the public half is what gets exchanged over the wire and stored in
/// the tracker; the secret half, when present, lets this identity
/// authenticate as itself during a handshake and sign certificates.
#[derive(Clone)]
pub struct Identity {
    public: PublicKey,
    secret: Option<SecretKey>,
}

impl Identity {
    /// generate a fresh identity from a cryptographically secure RNG
    pub fn generate<RNG>(rng: RNG) -> Self
    where
        RNG: RngCore + CryptoRng,
    {
        let secret = SecretKey::new(rng);
        let public = secret.public_key();

        Self {
            public,
            secret: Some(secret),
        }
    }

    /// an identity known only by its public key, e.g. a remote peer
    /// learned from a query or the tracker
    pub fn from_public_key(public: PublicKey) -> Self {
        Self {
            public,
            secret: None,
        }
    }

    /// an identity this node can authenticate as
    pub fn from_secret_key(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self {
            public,
            secret: Some(secret),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> Option<&SecretKey> {
        self.secret.as_ref()
    }

    pub fn has_secret_key(&self) -> bool {
        self.secret.is_some()
    }

    /// the raw secret key bytes, for persisting this identity to disk
    ///
    /// `None` for a public-only identity.
    pub fn to_secret_bytes(&self) -> Option<Vec<u8>> {
        self.secret.as_ref().map(|secret| secret.as_ref().to_vec())
    }

    /// reconstruct an identity from bytes written by [`to_secret_bytes`](Self::to_secret_bytes)
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let secret = SecretKey::try_from(bytes).map_err(|_| IdentityError::InvalidSecretKey)?;
        Ok(Self::from_secret_key(secret))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.public)
    }

    /// sign `data` with this identity's secret key
    ///
    /// returns [`IdentityError::MissingSecretKey`] if this identity is
    /// public-only.
    pub fn sign(&self, data: impl AsRef<[u8]>) -> Result<ed25519::Signature, IdentityError> {
        let secret = self.secret.as_ref().ok_or(IdentityError::MissingSecretKey)?;
        Ok(secret.sign(data))
    }

    pub fn verify(&self, data: impl AsRef<[u8]>, signature: &ed25519::Signature) -> bool {
        self.public.verify(data, signature)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for Identity {}

impl std::hash::Hash for Identity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.public.as_ref().hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.public.as_ref()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &hex::encode(self.public.as_ref()))
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}

impl From<PublicKey> for Identity {
    fn from(public: PublicKey) -> Self {
        Self::from_public_key(public)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| IdentityError::InvalidPublicKey)?;
        let public =
            PublicKey::try_from(bytes.as_slice()).map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self::from_public_key(public))
    }
}

impl TryFrom<&[u8]> for Identity {
    type Error = IdentityError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let public = PublicKey::try_from(bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self::from_public_key(public))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn roundtrips_through_hex() {
        let identity = Identity::generate(OsRng);
        let s = identity.to_string();
        let parsed: Identity = s.parse().unwrap();

        assert_eq!(identity, parsed);
    }

    #[test]
    fn sign_and_verify() {
        let identity = Identity::generate(OsRng);
        let signature = identity.sign(b"hello").unwrap();

        assert!(identity.verify(b"hello", &signature));
        assert!(!identity.verify(b"goodbye", &signature));
    }

    #[test]
    fn public_only_identity_cannot_sign() {
        let identity = Identity::generate(OsRng);
        let public_only = Identity::from_public_key(identity.public_key().clone());

        assert!(public_only.sign(b"hello").is_err());
    }
}
