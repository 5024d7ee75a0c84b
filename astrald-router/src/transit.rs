//! wire structures exchanged with a peer's `router` service during transit routing

use astrald_identity::{Certificate, Identity, IdentityError};
use astrald_net::NetError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use keynesis::key::ed25519::PublicKey;
use std::convert::TryFrom;

/// request sent to a transit peer's `router` service
pub struct QueryParams {
    pub target: Identity,
    pub name: String,
    pub nonce: u64,
    pub cert: Option<Certificate>,
}

impl QueryParams {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        let target_bytes = self.target.public_key().as_ref();
        buf.put_u8(target_bytes.len() as u8);
        buf.extend_from_slice(target_bytes);

        buf.put_u8(self.name.len() as u8);
        buf.extend_from_slice(self.name.as_bytes());

        buf.put_u64(self.nonce);

        match &self.cert {
            Some(cert) => {
                let encoded = cert.encode();
                buf.put_u16(encoded.len() as u16);
                buf.extend_from_slice(&encoded);
            }
            None => buf.put_u16(0),
        }

        buf.freeze()
    }

    pub fn decode(mut data: Bytes) -> Result<Self, NetError> {
        if data.remaining() < 1 {
            return Err(malformed("empty QueryParams"));
        }
        let target_len = data.get_u8() as usize;
        if data.remaining() < target_len {
            return Err(malformed("truncated target identity"));
        }
        let target_bytes = data.copy_to_bytes(target_len);
        let target = Identity::from_public_key(
            PublicKey::try_from(target_bytes.as_ref()).map_err(|_| malformed("bad target identity"))?,
        );

        if data.remaining() < 1 {
            return Err(malformed("missing name_len"));
        }
        let name_len = data.get_u8() as usize;
        if data.remaining() < name_len {
            return Err(malformed("truncated name"));
        }
        let name_bytes = data.copy_to_bytes(name_len);
        let name = String::from_utf8(name_bytes.to_vec()).map_err(|_| malformed("name is not utf-8"))?;

        if data.remaining() < 8 {
            return Err(malformed("missing nonce"));
        }
        let nonce = data.get_u64();

        if data.remaining() < 2 {
            return Err(malformed("missing cert_len"));
        }
        let cert_len = data.get_u16() as usize;
        let cert = if cert_len == 0 {
            None
        } else {
            if data.remaining() < cert_len {
                return Err(malformed("truncated certificate"));
            }
            let cert_bytes = data.copy_to_bytes(cert_len);
            Some(Certificate::decode(&cert_bytes).map_err(from_identity_error)?)
        };

        Ok(Self {
            target,
            name,
            nonce,
            cert,
        })
    }
}

/// response from a transit peer's `router` service
pub struct QueryResponse {
    pub proxy_service: String,
    pub cert: Option<Certificate>,
}

impl QueryResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        buf.put_u16(self.proxy_service.len() as u16);
        buf.extend_from_slice(self.proxy_service.as_bytes());

        match &self.cert {
            Some(cert) => {
                let encoded = cert.encode();
                buf.put_u16(encoded.len() as u16);
                buf.extend_from_slice(&encoded);
            }
            None => buf.put_u16(0),
        }

        buf.freeze()
    }

    pub fn decode(mut data: Bytes) -> Result<Self, NetError> {
        if data.remaining() < 2 {
            return Err(malformed("missing proxy_name_len"));
        }
        let name_len = data.get_u16() as usize;
        if data.remaining() < name_len {
            return Err(malformed("truncated proxy service name"));
        }
        let name_bytes = data.copy_to_bytes(name_len);
        let proxy_service =
            String::from_utf8(name_bytes.to_vec()).map_err(|_| malformed("proxy service name is not utf-8"))?;

        if data.remaining() < 2 {
            return Err(malformed("missing cert_len"));
        }
        let cert_len = data.get_u16() as usize;
        let cert = if cert_len == 0 {
            None
        } else {
            if data.remaining() < cert_len {
                return Err(malformed("truncated certificate"));
            }
            let cert_bytes = data.copy_to_bytes(cert_len);
            Some(Certificate::decode(&cert_bytes).map_err(from_identity_error)?)
        };

        Ok(Self { proxy_service, cert })
    }
}

fn malformed(reason: &str) -> NetError {
    NetError::ProtocolError(reason.to_owned())
}

fn from_identity_error(error: IdentityError) -> NetError {
    NetError::ProtocolError(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn decodes_a_request_with_no_certificate() {
        let target = Identity::generate(OsRng);
        let params = QueryParams {
            target: Identity::from_public_key(*target.public_key()),
            name: "router".to_owned(),
            nonce: 42,
            cert: None,
        };

        let decoded = QueryParams::decode(params.encode()).unwrap();
        assert_eq!(decoded.target.public_key(), target.public_key());
        assert_eq!(decoded.name, "router");
        assert_eq!(decoded.nonce, 42);
        assert!(decoded.cert.is_none());
    }

    #[test]
    fn rejects_a_truncated_request() {
        let target = Identity::generate(OsRng);
        let params = QueryParams {
            target,
            name: "router".to_owned(),
            nonce: 1,
            cert: None,
        };

        let mut encoded = params.encode();
        let truncated = encoded.split_to(encoded.len() - 3);
        assert!(QueryParams::decode(truncated).is_err());
    }

    #[test]
    fn rejects_an_empty_response() {
        assert!(QueryResponse::decode(Bytes::new()).is_err());
    }
}
