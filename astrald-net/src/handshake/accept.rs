use crate::{
    codec::handshake::{HandshakeInitialize, HandshakeResponse},
    Handle,
};
use anyhow::{bail, Context as _, Result};
use keynesis::{
    hash::Blake2b,
    key::{
        ed25519::{self, PublicKey},
        Dh,
    },
    noise::{ik::A, IK},
};
use rand_core::{CryptoRng, RngCore};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// accept an incoming handshake
///
/// the initiator sends the first Noise IK message to authenticate
/// itself; the responder can inspect the claimed identity (`check_id`)
/// and reject the connection before replying.
pub struct Accepting<I, O, RNG, K = ed25519::SecretKey> {
    reader: I,
    writer: O,
    state: IK<K, Blake2b, RNG, A>,
}

impl<I, O, K, RNG> Accepting<I, O, RNG, K>
where
    K: Dh,
    RNG: CryptoRng + RngCore,
{
    pub(crate) fn new(rng: RNG, reader: I, writer: O) -> Self {
        Self {
            reader,
            writer,
            state: IK::new(rng, &[]),
        }
    }
}

impl<I, O, K, RNG> Accepting<I, O, RNG, K>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    K: Dh,
    RNG: CryptoRng + RngCore,
{
    /// perform the responder side of the handshake
    ///
    /// `check_id` inspects the initiator's claimed public key before
    /// the reply is sent; returning `false` rejects the connection.
    ///
    /// # Errors
    ///
    /// fails for IO errors, unsupported protocol versions, rejected
    /// identities, or a failed Noise handshake.
    pub async fn accept<F>(self, k: &K, check_id: F) -> Result<Handle<I, O>>
    where
        F: Fn(&PublicKey) -> bool,
    {
        let Self {
            mut reader,
            mut writer,
            state,
        } = self;

        let mut bytes = [0; HandshakeInitialize::SIZE];

        reader
            .read_exact(&mut bytes)
            .await
            .context("cannot receive the Noise IK initiate handshake")?;

        let message = HandshakeInitialize::from_bytes(bytes);

        if !message.version().is_supported() {
            bail!("unsupported version {:?}", message.version());
        }

        let state = state
            .receive(k, message.message())
            .context("Noise IK handshake initiate failed")?;

        if !check_id(state.remote_public_identity()) {
            bail!(
                "rejecting connection with {}",
                state.remote_public_identity()
            )
        }

        let mut message = HandshakeResponse::DEFAULT;

        let state = state
            .reply(&mut message.message_mut())
            .context("cannot prepare the Noise handshake response")?;

        writer
            .write_all(message.as_ref())
            .await
            .context("cannot send the Noise IK response handshake")?;

        Ok(Handle::new(reader, writer, state))
    }
}
