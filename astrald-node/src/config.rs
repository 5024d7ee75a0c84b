use crate::{keepalive, network, secret};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, path::Path};
use structopt::StructOpt;

/// a peer this node should try to keep linked, independent of whether
/// anything is currently querying it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StickyPeer {
    /// hex-encoded public key
    pub identity: String,

    /// addresses to try dialing this peer at, tried in order
    #[serde(default)]
    pub addresses: Vec<SocketAddr>,
}

impl StickyPeer {
    pub fn identity(&self) -> Result<astrald_identity::Identity> {
        self.identity
            .parse()
            .map_err(|error| anyhow::anyhow!("invalid peer identity {}: {:?}", self.identity, error))
    }

    pub fn addresses(&self) -> Vec<astrald_net::Address> {
        self.addresses
            .iter()
            .map(|addr| astrald_net::transport::tcp::address(*addr))
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, StructOpt, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[structopt(flatten)]
    #[serde(default)]
    pub secret: secret::Config,

    #[structopt(flatten)]
    #[serde(default)]
    pub network: network::Config,

    /// peers to keep a keepalive task running for
    #[structopt(skip)]
    #[serde(default)]
    pub peers: Vec<StickyPeer>,
}

impl Config {
    pub const EXAMPLE: &'static str = include_str!("config.yaml");

    pub fn from_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open file: {}", path.display()))?;
        serde_yaml::from_reader(file).with_context(|| format!("invalid config file: {}", path.display()))
    }
}

/// a [`keepalive::Resolver`] backed by each peer's configured addresses,
/// ignoring anything the tracker has learned on its own
pub struct ConfiguredResolver {
    addresses: HashMap<astrald_identity::Identity, Vec<astrald_net::Address>>,
}

impl ConfiguredResolver {
    pub fn new(peers: &[StickyPeer]) -> Result<Self> {
        let mut addresses = HashMap::new();
        for peer in peers {
            addresses.insert(peer.identity()?, peer.addresses());
        }
        Ok(Self { addresses })
    }
}

#[async_trait::async_trait]
impl keepalive::Resolver for ConfiguredResolver {
    async fn resolve(&self, identity: &astrald_identity::Identity) -> Vec<astrald_net::Address> {
        self.addresses.get(identity).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_example() {
        let example = Config::EXAMPLE;

        let _: Config = serde_yaml::from_str(example).expect("valid example");
    }
}
