use anyhow::{Context as _, Result};
use astrald_identity::Identity;
use astrald_net::Address;
use std::{
    convert::TryInto,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

/// persisted directory of addresses peers have been reachable at
///
/// rows are keyed by `(identity, network, address)` and carry an
/// expiry; `purge` drops everything past its expiry and
/// `forget_identity` drops everything for one identity outright, the
/// two operations a tracker needs to expose.
pub struct Tracker {
    db: sled::Tree,
}

impl Tracker {
    pub fn open(db: &sled::Db) -> Result<Self> {
        let db = db.open_tree("tracker").context("cannot open tracker tree")?;
        Ok(Self { db })
    }

    /// record that `identity` can be reached at `address`, valid until
    /// `expires_at`
    pub fn remember(&self, identity: &Identity, address: &Address, expires_at: SystemTime) -> Result<()> {
        let key = row_key(identity, address);
        let expires_at_unix = expires_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.db
            .insert(key, &expires_at_unix.to_be_bytes())
            .context("cannot write tracker row")?;
        Ok(())
    }

    /// every unexpired address known for `identity`, most recently
    /// inserted order not guaranteed
    pub fn addresses_for(&self, identity: &Identity) -> Result<Vec<Address>> {
        let now = now_unix();
        let prefix = identity.public_key().as_ref().to_vec();

        let mut addresses = Vec::new();
        for entry in self.db.scan_prefix(&prefix) {
            let (key, value) = entry.context("cannot scan tracker tree")?;
            let expires_at = u64::from_be_bytes(value.as_ref().try_into().unwrap_or([0; 8]));
            if expires_at <= now {
                continue;
            }
            if let Some(address) = decode_address(&key, prefix.len()) {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    /// delete every row past its expiry
    pub fn purge(&self) -> Result<usize> {
        let now = now_unix();
        let mut removed = 0;

        for entry in self.db.iter() {
            let (key, value) = entry.context("cannot iterate tracker tree")?;
            let expires_at = u64::from_be_bytes(value.as_ref().try_into().unwrap_or([0; 8]));
            if expires_at <= now {
                self.db.remove(&key).context("cannot remove expired tracker row")?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// delete every address known for `identity`
    pub fn forget_identity(&self, identity: &Identity) -> Result<usize> {
        let prefix = identity.public_key().as_ref().to_vec();
        let mut removed = 0;

        for entry in self.db.scan_prefix(&prefix) {
            let (key, _) = entry.context("cannot scan tracker tree")?;
            self.db.remove(&key).context("cannot remove tracker row")?;
            removed += 1;
        }

        Ok(removed)
    }
}

fn row_key(identity: &Identity, address: &Address) -> Vec<u8> {
    let mut key = identity.public_key().as_ref().to_vec();
    key.extend_from_slice(address.network().as_bytes());
    key.push(0);
    key.extend_from_slice(address.bytes());
    key
}

fn decode_address(key: &[u8], identity_len: usize) -> Option<Address> {
    let rest = key.get(identity_len..)?;
    let separator = rest.iter().position(|&b| b == 0)?;
    let network = std::str::from_utf8(&rest[..separator]).ok()?;
    let bytes = &rest[separator + 1..];
    Some(Address::new(network, bytes.to_vec()))
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use std::time::Duration;

    #[test]
    fn remembers_and_purges() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tracker = Tracker::open(&db).unwrap();

        let identity = Identity::generate(OsRng);
        let address = Address::new("tcp", b"127.0.0.1:1234".to_vec());

        tracker
            .remember(&identity, &address, SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        assert_eq!(tracker.addresses_for(&identity).unwrap().len(), 1);

        tracker
            .remember(&identity, &address, SystemTime::now() - Duration::from_secs(1))
            .unwrap();
        assert!(tracker.addresses_for(&identity).unwrap().is_empty());

        let purged = tracker.purge().unwrap();
        assert_eq!(purged, 1);
    }

    #[test]
    fn forgets_an_identity() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tracker = Tracker::open(&db).unwrap();

        let identity = Identity::generate(OsRng);
        let address = Address::new("tcp", b"127.0.0.1:1234".to_vec());
        tracker
            .remember(&identity, &address, SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        assert_eq!(tracker.forget_identity(&identity).unwrap(), 1);
        assert!(tracker.addresses_for(&identity).unwrap().is_empty());
    }
}
