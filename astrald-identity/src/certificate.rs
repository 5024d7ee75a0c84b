use crate::{Identity, IdentityError};
use keynesis::key::ed25519::{PublicKey, Signature};
use std::{
    convert::TryFrom,
    time::{SystemTime, UNIX_EPOCH},
};

/// a time-bounded vouch from one identity for another
///
/// used by the router to let a peer claim it is routing on behalf of
/// a caller it is not itself (transit queries): the issuer signs over
/// `(issuer, subject, expires_unix_nanos)` and anyone holding the
/// issuer's public key can check the vouch without contacting it.
#[derive(Clone)]
pub struct Certificate {
    issuer: Identity,
    subject: Identity,
    expires_unix_nanos: u64,
    signature: Signature,
}

impl Certificate {
    /// issue a certificate naming `subject`, signed by `issuer`
    ///
    /// `issuer` must hold a secret key.
    pub fn sign(
        issuer: &Identity,
        subject: &Identity,
        expires_unix_nanos: u64,
    ) -> Result<Self, IdentityError> {
        let message = Self::signed_message(issuer, subject, expires_unix_nanos);
        let signature = issuer.sign(&message)?;

        Ok(Self {
            issuer: issuer.clone(),
            subject: subject.clone(),
            expires_unix_nanos,
            signature,
        })
    }

    pub fn issuer(&self) -> &Identity {
        &self.issuer
    }

    pub fn subject(&self) -> &Identity {
        &self.subject
    }

    pub fn expires_unix_nanos(&self) -> u64 {
        self.expires_unix_nanos
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// check the signature only; expiry is a router-level concern so
    /// that callers can apply their own clock skew tolerance
    pub fn verify_signature(&self) -> bool {
        let message = Self::signed_message(&self.issuer, &self.subject, self.expires_unix_nanos);
        self.issuer.verify(&message, &self.signature)
    }

    /// check the signature and expiry against `now`, the caller's own
    /// clock reading
    pub fn verify(&self, now: SystemTime) -> Result<(), IdentityError> {
        if !self.verify_signature() {
            return Err(IdentityError::InvalidSignature);
        }

        let now_nanos = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        if now_nanos >= self.expires_unix_nanos {
            return Err(IdentityError::CertificateExpired);
        }

        Ok(())
    }

    fn signed_message(issuer: &Identity, subject: &Identity, expires_unix_nanos: u64) -> Vec<u8> {
        let mut message = Vec::with_capacity(64 + 64 + 8);
        message.extend_from_slice(issuer.public_key().as_ref());
        message.extend_from_slice(subject.public_key().as_ref());
        message.extend_from_slice(&expires_unix_nanos.to_be_bytes());
        message
    }

    /// serialize for wire transfer: each key and the signature are
    /// length-prefixed rather than assumed fixed-size, so a change in
    /// the underlying key encoding doesn't change this format
    pub fn encode(&self) -> Vec<u8> {
        let issuer_bytes = self.issuer.public_key().as_ref();
        let subject_bytes = self.subject.public_key().as_ref();
        let signature_bytes = self.signature.as_ref();

        let mut bytes = Vec::with_capacity(2 + issuer_bytes.len() + subject_bytes.len() + 8 + signature_bytes.len());
        bytes.push(issuer_bytes.len() as u8);
        bytes.extend_from_slice(issuer_bytes);
        bytes.push(subject_bytes.len() as u8);
        bytes.extend_from_slice(subject_bytes);
        bytes.extend_from_slice(&self.expires_unix_nanos.to_be_bytes());
        bytes.push(signature_bytes.len() as u8);
        bytes.extend_from_slice(signature_bytes);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IdentityError> {
        let mut cursor = bytes;

        let issuer = Identity::from_public_key(Self::take_key(&mut cursor)?);
        let subject = Identity::from_public_key(Self::take_key(&mut cursor)?);

        if cursor.len() < 8 {
            return Err(IdentityError::InvalidCertificate);
        }
        let (expires_bytes, rest) = cursor.split_at(8);
        let expires_unix_nanos = u64::from_be_bytes(expires_bytes.try_into().unwrap());
        cursor = rest;

        let signature_len = *cursor.first().ok_or(IdentityError::InvalidCertificate)? as usize;
        cursor = &cursor[1..];
        let signature_bytes = cursor.get(..signature_len).ok_or(IdentityError::InvalidCertificate)?;
        let signature =
            Signature::try_from(signature_bytes).map_err(|_| IdentityError::InvalidSignature)?;

        Ok(Self {
            issuer,
            subject,
            expires_unix_nanos,
            signature,
        })
    }

    fn take_key(cursor: &mut &[u8]) -> Result<PublicKey, IdentityError> {
        let len = *cursor.first().ok_or(IdentityError::InvalidCertificate)? as usize;
        *cursor = &cursor[1..];
        let key_bytes = cursor.get(..len).ok_or(IdentityError::InvalidCertificate)?;
        let key = PublicKey::try_from(key_bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
        *cursor = &cursor[len..];
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use std::time::Duration;

    #[test]
    fn signed_certificate_verifies() {
        let issuer = Identity::generate(OsRng);
        let subject = Identity::generate(OsRng);

        let now = SystemTime::now();
        let expires = now
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64
            + Duration::from_secs(60).as_nanos() as u64;

        let cert = Certificate::sign(&issuer, &subject, expires).unwrap();

        assert!(cert.verify(now).is_ok());
    }

    #[test]
    fn expired_certificate_fails() {
        let issuer = Identity::generate(OsRng);
        let subject = Identity::generate(OsRng);

        let cert = Certificate::sign(&issuer, &subject, 1).unwrap();

        assert!(matches!(
            cert.verify(SystemTime::now()),
            Err(IdentityError::CertificateExpired)
        ));
    }

    #[test]
    fn tampered_subject_fails_signature() {
        let issuer = Identity::generate(OsRng);
        let subject = Identity::generate(OsRng);
        let impostor = Identity::generate(OsRng);

        let mut cert = Certificate::sign(&issuer, &subject, u64::MAX).unwrap();
        cert.subject = impostor;

        assert!(!cert.verify_signature());
    }

    #[test]
    fn encode_decode_roundtrips() {
        let issuer = Identity::generate(OsRng);
        let subject = Identity::generate(OsRng);

        let cert = Certificate::sign(&issuer, &subject, u64::MAX).unwrap();
        let decoded = Certificate::decode(&cert.encode()).unwrap();

        assert_eq!(decoded.issuer(), &issuer);
        assert_eq!(decoded.subject(), &subject);
        assert_eq!(decoded.expires_unix_nanos(), u64::MAX);
        assert!(decoded.verify_signature());
    }

    #[test]
    fn public_only_issuer_cannot_sign() {
        let issuer = Identity::generate(OsRng);
        let issuer_public_only = Identity::from_public_key(issuer.public_key().clone());
        let subject = Identity::generate(OsRng);

        assert!(Certificate::sign(&issuer_public_only, &subject, u64::MAX).is_err());
    }
}
