use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// a raw duplex byte stream a link can be built on top of
///
/// any object implementing both halves of tokio's IO traits qualifies;
/// the handshake module turns one of these into an authenticated
/// [`Handle`](crate::Handle).
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// location at which a peer might be reached
///
/// opaque outside of the network it names: a `tcp` address is a
/// socket address rendered as bytes, other networks may use
/// something else entirely. compared by value, carried by copy.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    network: String,
    bytes: Vec<u8>,
}

impl Address {
    pub fn new(network: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            network: network.into(),
            bytes: bytes.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, hex::encode(&self.bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.to_string()).finish()
    }
}

pub mod tcp {
    //! the `tcp` network: addresses are a [`SocketAddr`] rendered to/from bytes
    use super::Address;
    use anyhow::{Context as _, Result};
    use std::net::SocketAddr;
    use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

    pub const NETWORK: &str = "tcp";

    pub fn address(addr: SocketAddr) -> Address {
        Address::new(NETWORK, addr.to_string().into_bytes())
    }

    pub fn socket_addr(address: &Address) -> Result<SocketAddr> {
        anyhow::ensure!(address.network() == NETWORK, "not a tcp address");
        let s = std::str::from_utf8(address.bytes()).context("tcp address is not utf-8")?;
        s.parse().context("tcp address is not a valid socket address")
    }

    /// listens for inbound TCP connections
    ///
    /// handshake processing is deliberately left to the caller so that
    /// accepting a new peer never blocks accepting the next one.
    pub struct Listener {
        listener: TcpListener,
    }

    impl Listener {
        pub async fn bind<A>(addr: A) -> Result<Self>
        where
            A: ToSocketAddrs + std::fmt::Display,
        {
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("cannot listen on {}", addr))?;

            Ok(Self { listener })
        }

        pub fn local_addr(&self) -> Result<SocketAddr> {
            self.listener.local_addr().context("cannot read local address")
        }

        /// accept the next inbound connection
        ///
        /// returns the raw stream and the peer's address; no handshake
        /// has happened yet.
        pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
            self.listener
                .accept()
                .await
                .context("cannot accept new peer from the listener")
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
        TcpStream::connect(addr)
            .await
            .with_context(|| format!("cannot connect to {}", addr))
    }
}
