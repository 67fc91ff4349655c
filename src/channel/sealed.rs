//! Sealed channel keyed per session.
//!
//! Both ends share the ECDH of their static identities. Each channel draws
//! a random session nonce and keys its sending direction with HKDF over
//! that secret salted by the nonce, so the first Hello already carries
//! payload and a new channel never reuses an old channel's key. The opening
//! side sends Hello frames until the peer echoes its nonce back.

use hkdf::Hkdf;
use rand::RngCore;
use secp256k1::{ecdh, SecretKey};
use sha2::Sha256;
use std::fmt;
use tracing::trace;

use super::{
    peek_frame, read_counter, ChannelError, ChannelFactory, CipherState, FrameKind,
    HandshakeStatus, NonceLog, ReplayWindow, SecureChannel, SessionNonce, DATA_HEADER_SIZE,
    FRAME_DATA, FRAME_HELLO, HELLO_HEADER_SIZE, SESSION_NONCE_SIZE, TAG_SIZE,
};
use crate::identity::{Address, Identity, PUBLIC_KEY_SIZE};
use crate::session::SessionHandle;

/// HKDF info prefix for channel key derivation.
const KDF_INFO: &[u8] = b"meshcore-channel-v2";

/// Channel keyed from both static identities and the sender's session nonce.
pub struct SealedChannel {
    shared: [u8; 32],
    local_key: [u8; PUBLIC_KEY_SIZE],
    peer: Address,
    local_handle: SessionHandle,
    local_nonce: SessionNonce,
    peer_nonce: Option<SessionNonce>,
    remote_handle: Option<SessionHandle>,
    send: CipherState,
    recv: Option<CipherState>,
    replay: ReplayWindow,
    /// The peer has echoed our nonce, so it can open data frames.
    confirmed: bool,
    status: HandshakeStatus,
    log: NonceLog,
}

impl SealedChannel {
    /// Open a channel between `secret` (owning `local`) and `peer` under a
    /// fresh session nonce.
    ///
    /// `log` should be shared by every channel of the local identity.
    pub fn new(
        secret: &SecretKey,
        local: &Address,
        peer: &Address,
        local_handle: SessionHandle,
        log: NonceLog,
    ) -> Result<Self, ChannelError> {
        let point = ecdh::shared_secret_point(&peer.pubkey_full(), secret);
        let mut shared = [0u8; 32];
        shared.copy_from_slice(&point[..32]);

        let mut local_nonce = [0u8; SESSION_NONCE_SIZE];
        rand::rng().fill_bytes(&mut local_nonce);

        let local_key = local.key_bytes();
        let send_key = derive_key(&shared, &local_nonce, &local_key, &peer.key_bytes())?;

        Ok(Self {
            shared,
            local_key,
            peer: *peer,
            local_handle,
            local_nonce,
            peer_nonce: None,
            remote_handle: None,
            send: CipherState::new(send_key),
            recv: None,
            replay: ReplayWindow::new(),
            confirmed: false,
            status: HandshakeStatus::New,
            log,
        })
    }

    pub fn peer(&self) -> &Address {
        &self.peer
    }

    pub fn local_handle(&self) -> SessionHandle {
        self.local_handle
    }

    /// The peer's receive handle, once learned.
    pub fn remote_handle(&self) -> Option<SessionHandle> {
        self.remote_handle
    }

    pub fn local_nonce(&self) -> &SessionNonce {
        &self.local_nonce
    }

    /// Session nonce of the peer's current channel, once learned.
    pub fn peer_nonce(&self) -> Option<&SessionNonce> {
        self.peer_nonce.as_ref()
    }

    /// Whether the peer has confirmed our nonce and data frames are sent.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    fn seal(&mut self, mut header: Vec<u8>, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let counter = self.send.next_counter()?;
        header.extend_from_slice(&counter.to_le_bytes());
        let ciphertext = self
            .send
            .encrypt_with_counter_and_aad(plaintext, counter, &header)?;
        header.extend_from_slice(&ciphertext);
        Ok(header)
    }

    /// Authenticate a frame under `recv` against `window`, committing the
    /// counter only when the tag verifies.
    fn open(
        recv: &CipherState,
        frame: &[u8],
        header_len: usize,
        window: &mut ReplayWindow,
    ) -> Result<Vec<u8>, ChannelError> {
        let counter = read_counter(&frame[header_len - 8..header_len]);
        if !window.check(counter) {
            return Err(ChannelError::Replay(counter));
        }
        let plaintext =
            recv.decrypt_with_counter_and_aad(&frame[header_len..], counter, &frame[..header_len])?;
        window.accept(counter);
        Ok(plaintext)
    }

    /// Store the peer's current nonce and highest counter in the log.
    fn retire_peer_nonce(&self) {
        if let Some(nonce) = self.peer_nonce
            && let Some(highest) = self.replay.highest()
        {
            self.log.record(&self.peer, nonce, highest);
        }
    }

    fn open_hello(
        &mut self,
        frame: &[u8],
        sender_nonce: SessionNonce,
    ) -> Result<Vec<u8>, ChannelError> {
        if let Some(recv) = &self.recv
            && self.peer_nonce == Some(sender_nonce)
        {
            let mut window = self.replay.clone();
            let plaintext = Self::open(recv, frame, HELLO_HEADER_SIZE, &mut window)?;
            self.replay = window;
            return Ok(plaintext);
        }

        // A nonce this channel does not hold: a new peer session, or one
        // already retired whose counters must not be accepted twice.
        let recv = CipherState::new(derive_key(
            &self.shared,
            &sender_nonce,
            &self.peer.key_bytes(),
            &self.local_key,
        )?);
        let mut window = match self.log.highest(&self.peer, &sender_nonce) {
            Some(highest) => ReplayWindow::after(highest),
            None => ReplayWindow::new(),
        };
        let plaintext = Self::open(&recv, frame, HELLO_HEADER_SIZE, &mut window)?;

        if self.peer_nonce.is_some() {
            trace!(peer = %self.peer.short(), "Peer session restarted");
        }
        self.retire_peer_nonce();
        self.peer_nonce = Some(sender_nonce);
        self.recv = Some(recv);
        self.replay = window;
        self.confirmed = false;
        Ok(plaintext)
    }
}

impl SecureChannel for SealedChannel {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        match (self.confirmed, self.remote_handle) {
            (true, Some(remote)) => {
                let mut header = Vec::with_capacity(DATA_HEADER_SIZE + plaintext.len() + TAG_SIZE);
                header.push(FRAME_DATA);
                header.extend_from_slice(&remote.to_le_bytes());
                header.extend_from_slice(&self.local_handle.to_le_bytes());
                self.seal(header, plaintext)
            }
            _ => {
                let mut header =
                    Vec::with_capacity(HELLO_HEADER_SIZE + plaintext.len() + TAG_SIZE);
                header.push(FRAME_HELLO);
                header.extend_from_slice(&self.local_handle.to_le_bytes());
                header.extend_from_slice(&self.local_key);
                header.extend_from_slice(&self.local_nonce);
                header.extend_from_slice(&self.peer_nonce.unwrap_or([0u8; SESSION_NONCE_SIZE]));
                let frame = self.seal(header, plaintext)?;
                if self.status == HandshakeStatus::New {
                    self.status = HandshakeStatus::Sent;
                }
                Ok(frame)
            }
        }
    }

    fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        match peek_frame(frame).ok_or(ChannelError::NotFramed)? {
            FrameKind::Hello {
                sender_handle,
                sender_key,
                sender_nonce,
                echo_nonce,
            } => {
                if sender_key != self.peer.key_bytes() {
                    return Err(ChannelError::WrongPeer);
                }
                let plaintext = self.open_hello(frame, sender_nonce)?;
                if echo_nonce == self.local_nonce {
                    self.confirmed = true;
                }
                self.remote_handle = Some(sender_handle);
                self.status = HandshakeStatus::Established;
                Ok(plaintext)
            }
            FrameKind::Data {
                receiver_handle,
                sender_handle,
            } => {
                if receiver_handle != self.local_handle {
                    return Err(ChannelError::WrongHandle {
                        expected: self.local_handle,
                        got: receiver_handle,
                    });
                }
                if let Some(remote) = self.remote_handle
                    && remote != sender_handle
                {
                    return Err(ChannelError::WrongHandle {
                        expected: remote,
                        got: sender_handle,
                    });
                }
                let recv = self.recv.as_ref().ok_or(ChannelError::NoPeerKey)?;
                let mut window = self.replay.clone();
                let plaintext = Self::open(recv, frame, DATA_HEADER_SIZE, &mut window)?;
                self.replay = window;
                // The peer only sends data once it has our nonce.
                self.confirmed = true;
                self.remote_handle = Some(sender_handle);
                self.status = HandshakeStatus::Established;
                Ok(plaintext)
            }
        }
    }

    fn status(&self) -> HandshakeStatus {
        self.status
    }
}

impl Drop for SealedChannel {
    fn drop(&mut self) {
        self.retire_peer_nonce();
    }
}

impl fmt::Debug for SealedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedChannel")
            .field("peer", &self.peer.short())
            .field("local_handle", &self.local_handle)
            .field("remote_handle", &self.remote_handle)
            .field("confirmed", &self.confirmed)
            .field("status", &self.status)
            .finish()
    }
}

/// Key for the direction `sender` -> `receiver` under the sender's nonce.
fn derive_key(
    shared_x: &[u8; 32],
    nonce: &SessionNonce,
    sender: &[u8; PUBLIC_KEY_SIZE],
    receiver: &[u8; PUBLIC_KEY_SIZE],
) -> Result<[u8; 32], ChannelError> {
    let mut info = Vec::with_capacity(KDF_INFO.len() + 2 * PUBLIC_KEY_SIZE);
    info.extend_from_slice(KDF_INFO);
    info.extend_from_slice(sender);
    info.extend_from_slice(receiver);

    let hk = Hkdf::<Sha256>::new(Some(&nonce[..]), shared_x);
    let mut key = [0u8; 32];
    hk.expand(&info, &mut key)
        .map_err(|e| ChannelError::KeyAgreement(e.to_string()))?;
    Ok(key)
}

/// Opens [`SealedChannel`]s for the local identity.
///
/// Every channel it opens shares one [`NonceLog`].
pub struct SealedChannelFactory {
    secret: SecretKey,
    local: Address,
    log: NonceLog,
}

impl SealedChannelFactory {
    pub fn new(identity: &Identity) -> Self {
        Self {
            secret: identity.secret_key(),
            local: *identity.address(),
            log: NonceLog::new(),
        }
    }

    pub fn nonce_log(&self) -> &NonceLog {
        &self.log
    }
}

impl ChannelFactory for SealedChannelFactory {
    fn open(
        &self,
        peer: &Address,
        local_handle: SessionHandle,
    ) -> Result<Box<dyn SecureChannel>, ChannelError> {
        let channel =
            SealedChannel::new(&self.secret, &self.local, peer, local_handle, self.log.clone())?;
        Ok(Box::new(channel))
    }
}
