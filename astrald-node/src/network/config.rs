use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use structopt::StructOpt;

/// network configuration of the node
#[derive(StructOpt, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// the address the node listens for incoming links on
    #[structopt(long = "listen-address", env = "ASTRALD_LISTEN_ADDRESS")]
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// how many outbound addresses to race a handshake against at once
    /// when dialing a peer with more than one known address
    #[structopt(long = "dial-workers")]
    #[serde(default = "default_dial_workers")]
    pub dial_workers: usize,
}

fn default_listen_address() -> SocketAddr {
    "[::]:8825".parse().unwrap()
}

fn default_dial_workers() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            dial_workers: default_dial_workers(),
        }
    }
}
