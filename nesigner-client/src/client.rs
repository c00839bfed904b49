//! High-level signer API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use async_trait::async_trait;
use bytes::Bytes;
use nesigner_crypto::{ConversationKey, SecretKey, SessionKey};
use nesigner_protocol::{MessageType, PublicKey, ResponseFrame, ResultCode, IV_SIZE};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

/// Operations a Nostr signing device offers to the host.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Returns the device's public key, or `None` if no key is installed.
    async fn get_public_key(&self) -> Result<Option<PublicKey>, ClientError>;

    async fn nip04_encrypt(&self, pubkey: &PublicKey, plaintext: &str)
        -> Result<String, ClientError>;

    async fn nip04_decrypt(
        &self,
        pubkey: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, ClientError>;

    async fn nip44_encrypt(&self, pubkey: &PublicKey, plaintext: &str)
        -> Result<String, ClientError>;

    async fn nip44_decrypt(
        &self,
        pubkey: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, ClientError>;

    /// Signs a 32-byte event ID and returns the signature bytes.
    async fn sign(&self, event_id: &[u8; 32]) -> Result<Vec<u8>, ClientError>;

    /// Installs `key` (hex or `nsec1...`) under a new PIN.
    async fn update_key(&self, pin: &str, key: &str) -> Result<(), ClientError>;

    async fn remove_key(&self, pin: &str) -> Result<(), ClientError>;

    /// Round trip latency.
    async fn ping(&self) -> Result<Duration, ClientError>;

    async fn echo(&self, pin: &str, message: &str) -> Result<String, ClientError>;

    async fn close(&self) -> Result<(), ClientError>;
}

/// A session with a nesigner device.
///
/// Spawns the background reader on construction, so it must be created
/// inside a tokio runtime.
pub struct Nesigner {
    conn: Arc<Connection>,
    session_key: SessionKey,
    /// Device public key, once known.
    pubkey: Mutex<Option<PublicKey>>,
    reader_task: JoinHandle<()>,
}

impl Nesigner {
    /// Opens a session over `stream` with the default configuration.
    pub fn new<T>(stream: T, pin: &str) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_config(stream, pin, ConnectionConfig::default())
    }

    pub fn with_config<T>(stream: T, pin: &str, config: ConnectionConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let conn = Arc::new(Connection::new(stream, config));
        let reader = conn.clone();
        let reader_task = tokio::spawn(async move {
            match reader.read_loop().await {
                Ok(()) => tracing::debug!("Device closed the transport"),
                Err(e) => tracing::warn!("Reader stopped: {}", e),
            }
        });

        Self {
            conn,
            session_key: SessionKey::from_pin(pin),
            pubkey: Mutex::new(None),
            reader_task,
        }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Returns whether the session is still usable.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Fetches the device's one-time provisioning public key.
    pub async fn get_temp_pubkey(&self) -> Result<PublicKey, ClientError> {
        let response = self
            .roundtrip(
                MessageType::GetTempPubkey,
                PublicKey::SENTINEL,
                random_iv(),
                Bytes::new(),
            )
            .await?;
        Ok(PublicKey::from_slice(&response.payload)?)
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    /// Sends a request and requires an OK result.
    async fn roundtrip(
        &self,
        message_type: MessageType,
        pubkey: PublicKey,
        iv: [u8; IV_SIZE],
        payload: Bytes,
    ) -> Result<ResponseFrame, ClientError> {
        let response = self.conn.request(message_type, pubkey, iv, payload).await?;
        if !response.is_ok() {
            return Err(ClientError::Rejected {
                message_type,
                result: response.result,
            });
        }
        Ok(response)
    }

    /// Encrypts `plaintext` under `key` and a fresh IV, sends it, and returns
    /// the decrypted response payload.
    async fn sealed_roundtrip(
        &self,
        key: &SessionKey,
        message_type: MessageType,
        pubkey: PublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ClientError> {
        let iv = random_iv();
        let payload = Bytes::from(key.encrypt(&iv, plaintext));
        let response = self.roundtrip(message_type, pubkey, iv, payload).await?;
        Ok(key.decrypt(&response.iv, &response.payload)?)
    }

    /// Key the device should act with: cached, fetched, or the sentinel.
    async fn active_pubkey(&self) -> Result<PublicKey, ClientError> {
        Ok(self.get_public_key().await?.unwrap_or(PublicKey::SENTINEL))
    }

    async fn transform(
        &self,
        message_type: MessageType,
        counterparty: &PublicKey,
        text: &str,
    ) -> Result<String, ClientError> {
        let target = self.active_pubkey().await?;

        let mut plaintext = Vec::with_capacity(counterparty.as_bytes().len() + text.len());
        plaintext.extend_from_slice(counterparty.as_bytes());
        plaintext.extend_from_slice(text.as_bytes());

        let output = self
            .sealed_roundtrip(&self.session_key, message_type, target, &plaintext)
            .await?;
        into_utf8(message_type, output)
    }
}

#[async_trait]
impl Signer for Nesigner {
    async fn get_public_key(&self) -> Result<Option<PublicKey>, ClientError> {
        // Held across the fetch so concurrent first callers share one request.
        let mut cached = self.pubkey.lock().await;
        if let Some(pubkey) = *cached {
            return Ok(Some(pubkey));
        }

        // The IV doubles as the request nonce.
        let iv = random_iv();
        let payload = Bytes::from(self.session_key.encrypt(&iv, &iv));
        let response = self
            .conn
            .request(MessageType::NostrGetPublicKey, PublicKey::SENTINEL, iv, payload)
            .await?;

        match response.result_code() {
            Some(ResultCode::Ok) => {
                let data = self.session_key.decrypt(&response.iv, &response.payload)?;
                let pubkey = PublicKey::from_slice(&data)?;
                *cached = Some(pubkey);
                Ok(Some(pubkey))
            }
            Some(ResultCode::KeyNotFound) => {
                tracing::debug!("Device has no key installed");
                Ok(None)
            }
            _ => Err(ClientError::Rejected {
                message_type: MessageType::NostrGetPublicKey,
                result: response.result,
            }),
        }
    }

    async fn nip04_encrypt(
        &self,
        pubkey: &PublicKey,
        plaintext: &str,
    ) -> Result<String, ClientError> {
        self.transform(MessageType::NostrNip04Encrypt, pubkey, plaintext)
            .await
    }

    async fn nip04_decrypt(
        &self,
        pubkey: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, ClientError> {
        self.transform(MessageType::NostrNip04Decrypt, pubkey, ciphertext)
            .await
    }

    async fn nip44_encrypt(
        &self,
        pubkey: &PublicKey,
        plaintext: &str,
    ) -> Result<String, ClientError> {
        self.transform(MessageType::NostrNip44Encrypt, pubkey, plaintext)
            .await
    }

    async fn nip44_decrypt(
        &self,
        pubkey: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, ClientError> {
        self.transform(MessageType::NostrNip44Decrypt, pubkey, ciphertext)
            .await
    }

    async fn sign(&self, event_id: &[u8; 32]) -> Result<Vec<u8>, ClientError> {
        let target = self.active_pubkey().await?;
        self.sealed_roundtrip(
            &self.session_key,
            MessageType::NostrSignEvent,
            target,
            event_id,
        )
        .await
    }

    async fn update_key(&self, pin: &str, key: &str) -> Result<(), ClientError> {
        let new_session_key = SessionKey::from_pin(pin);
        let secret = SecretKey::parse(key)?;
        let pubkey = PublicKey::from_bytes(secret.x_only_public_key()?);

        let temp_pubkey = self.get_temp_pubkey().await?;
        let conversation_key = ConversationKey::derive(&secret, temp_pubkey.as_bytes())?;

        let mut source = Zeroizing::new(String::with_capacity(96));
        source.push_str(&secret.to_hex());
        source.push_str(&new_session_key.to_hex());
        let envelope = conversation_key.encrypt(&source)?;

        // The envelope is its own confidentiality layer; the frame is sent
        // as is.
        self.roundtrip(
            MessageType::UpdateKey,
            pubkey,
            random_iv(),
            Bytes::from(envelope.into_bytes()),
        )
        .await?;

        tracing::debug!("Installed key {}", pubkey);
        *self.pubkey.lock().await = Some(pubkey);
        Ok(())
    }

    async fn remove_key(&self, pin: &str) -> Result<(), ClientError> {
        let key = SessionKey::from_pin(pin);
        let iv = random_iv();
        let payload = Bytes::from(key.encrypt(&iv, &iv));
        self.roundtrip(MessageType::RemoveKey, PublicKey::SENTINEL, iv, payload)
            .await?;

        *self.pubkey.lock().await = None;
        Ok(())
    }

    async fn ping(&self) -> Result<Duration, ClientError> {
        let started = Instant::now();
        self.roundtrip(
            MessageType::Ping,
            PublicKey::SENTINEL,
            random_iv(),
            Bytes::new(),
        )
        .await?;
        Ok(started.elapsed())
    }

    async fn echo(&self, pin: &str, message: &str) -> Result<String, ClientError> {
        let key = SessionKey::from_pin(pin);
        let output = self
            .sealed_roundtrip(
                &key,
                MessageType::Echo,
                PublicKey::SENTINEL,
                message.as_bytes(),
            )
            .await?;
        into_utf8(MessageType::Echo, output)
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await?;
        self.reader_task.abort();
        Ok(())
    }
}

impl Drop for Nesigner {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn random_iv() -> [u8; IV_SIZE] {
    rand::random()
}

fn into_utf8(message_type: MessageType, bytes: Vec<u8>) -> Result<String, ClientError> {
    String::from_utf8(bytes).map_err(|_| {
        ClientError::InvalidResponse(format!("{} response is not valid UTF-8", message_type))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use nesigner_protocol::RequestFrame;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PIN: &str = "1234";

    fn scalar(n: u8) -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        SecretKey::from_bytes(bytes).unwrap()
    }

    /// Minimal device: holds an optional key and answers like the firmware.
    struct Device {
        session_key: SessionKey,
        pubkey: Option<PublicKey>,
        temp_secret: SecretKey,
    }

    impl Device {
        fn new(pubkey: Option<PublicKey>) -> Self {
            Self {
                session_key: SessionKey::from_pin(PIN),
                pubkey,
                temp_secret: scalar(7),
            }
        }

        fn reply(frame: &RequestFrame, result: ResultCode, payload: Vec<u8>) -> ResponseFrame {
            ResponseFrame::new(
                frame.message_type,
                frame.correlation_id,
                result,
                frame.pubkey,
                [0x5A; 16],
                Bytes::from(payload),
            )
        }

        fn sealed(&self, frame: &RequestFrame, plaintext: &[u8]) -> ResponseFrame {
            Self::reply(
                frame,
                ResultCode::Ok,
                self.session_key.encrypt(&[0x5A; 16], plaintext),
            )
        }

        fn handle(&mut self, frame: RequestFrame) -> Vec<ResponseFrame> {
            let response = match frame.message_type {
                MessageType::Ping => Self::reply(&frame, ResultCode::Ok, Vec::new()),
                MessageType::GetTempPubkey => {
                    assert!(frame.pubkey.is_sentinel());
                    assert!(frame.payload.is_empty());
                    let temp = self.temp_secret.x_only_public_key().unwrap();
                    Self::reply(&frame, ResultCode::Ok, temp.to_vec())
                }
                MessageType::NostrGetPublicKey => {
                    let nonce = self
                        .session_key
                        .decrypt(&frame.iv, &frame.payload)
                        .unwrap();
                    assert_eq!(nonce, frame.iv);
                    match self.pubkey {
                        Some(pubkey) => self.sealed(&frame, pubkey.as_bytes()),
                        None => Self::reply(&frame, ResultCode::KeyNotFound, Vec::new()),
                    }
                }
                MessageType::NostrNip04Encrypt
                | MessageType::NostrNip04Decrypt
                | MessageType::NostrNip44Encrypt
                | MessageType::NostrNip44Decrypt => {
                    assert_eq!(Some(frame.pubkey), self.pubkey);
                    let data = self
                        .session_key
                        .decrypt(&frame.iv, &frame.payload)
                        .unwrap();
                    let text = String::from_utf8(data[32..].to_vec()).unwrap();
                    let output = format!(
                        "{}:{}:{}",
                        frame.message_type,
                        hex::encode(&data[..32]),
                        text
                    );
                    self.sealed(&frame, output.as_bytes())
                }
                MessageType::NostrSignEvent => {
                    let event_id = self
                        .session_key
                        .decrypt(&frame.iv, &frame.payload)
                        .unwrap();
                    assert_eq!(event_id.len(), 32);
                    let signature = [event_id.clone(), event_id].concat();
                    self.sealed(&frame, &signature)
                }
                MessageType::Echo => {
                    let message = self
                        .session_key
                        .decrypt(&frame.iv, &frame.payload)
                        .ok()
                        .and_then(|m| String::from_utf8(m).ok());
                    match message {
                        Some(message) => self.sealed(&frame, message.as_bytes()),
                        None => Self::reply(&frame, ResultCode::Fail, Vec::new()),
                    }
                }
                MessageType::RemoveKey => {
                    match self.session_key.decrypt(&frame.iv, &frame.payload) {
                        Ok(nonce) if nonce == frame.iv => {
                            self.pubkey = None;
                            Self::reply(&frame, ResultCode::Ok, Vec::new())
                        }
                        _ => Self::reply(&frame, ResultCode::Fail, Vec::new()),
                    }
                }
                MessageType::UpdateKey => Self::reply(&frame, ResultCode::Ok, Vec::new()),
                MessageType::NostrGetRelays => {
                    Self::reply(&frame, ResultCode::ContentIllegal, Vec::new())
                }
            };
            vec![response]
        }
    }

    fn session(device: Device) -> (Nesigner, JoinHandle<Vec<RequestFrame>>) {
        let mut device = device;
        let (host, task) = mock::spawn_device(move |frame| device.handle(frame));
        (Nesigner::new(host, PIN), task)
    }

    fn installed() -> PublicKey {
        PublicKey::from_bytes(scalar(3).x_only_public_key().unwrap())
    }

    #[tokio::test]
    async fn test_get_public_key_cached() {
        let (signer, device) = session(Device::new(Some(installed())));

        assert_eq!(signer.get_public_key().await.unwrap(), Some(installed()));
        assert_eq!(signer.get_public_key().await.unwrap(), Some(installed()));

        signer.close().await.unwrap();
        let seen = device.await.unwrap();
        let fetches = seen
            .iter()
            .filter(|f| f.message_type == MessageType::NostrGetPublicKey)
            .count();
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_lookups_fetch_once() {
        let (signer, device) = session(Device::new(Some(installed())));

        let (first, second) = tokio::join!(signer.get_public_key(), signer.get_public_key());
        assert_eq!(first.unwrap(), Some(installed()));
        assert_eq!(second.unwrap(), Some(installed()));

        signer.close().await.unwrap();
        let seen = device.await.unwrap();
        let fetches = seen
            .iter()
            .filter(|f| f.message_type == MessageType::NostrGetPublicKey)
            .count();
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn test_get_public_key_not_found() {
        let (signer, _device) = session(Device::new(None));
        assert_eq!(signer.get_public_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_nip_transforms_address_device_key() {
        let (signer, _device) = session(Device::new(Some(installed())));
        let peer = PublicKey::from_bytes([0xAB; 32]);

        let output = signer.nip04_encrypt(&peer, "hello").await.unwrap();
        assert_eq!(
            output,
            format!("NOSTR_NIP04_ENCRYPT:{}:hello", "ab".repeat(32))
        );

        let output = signer.nip44_decrypt(&peer, "ciphertext").await.unwrap();
        assert!(output.starts_with("NOSTR_NIP44_DECRYPT:"));
        assert!(output.ends_with(":ciphertext"));

        assert!(signer.nip04_decrypt(&peer, "x").await.is_ok());
        assert!(signer.nip44_encrypt(&peer, "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_sign() {
        let (signer, _device) = session(Device::new(Some(installed())));
        let event_id = [0x42u8; 32];

        let signature = signer.sign(&event_id).await.unwrap();
        assert_eq!(signature.len(), 64);
        assert_eq!(&signature[..32], &event_id);
    }

    #[tokio::test]
    async fn test_echo_with_pin() {
        let (signer, _device) = session(Device::new(None));
        assert_eq!(signer.echo(PIN, "hello device").await.unwrap(), "hello device");

        let err = signer.echo("9999", "hello").await.unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::Fail));
        assert!(!err.is_session_fatal());
    }

    #[tokio::test]
    async fn test_ping() {
        let (signer, device) = session(Device::new(None));
        let latency = signer.ping().await.unwrap();
        assert!(latency < Duration::from_secs(5));

        signer.close().await.unwrap();
        let seen = device.await.unwrap();
        assert_eq!(seen[0].message_type, MessageType::Ping);
        assert!(seen[0].pubkey.is_sentinel());
        assert!(seen[0].payload.is_empty());
    }

    #[tokio::test]
    async fn test_remove_key_clears_cache() {
        let (signer, _device) = session(Device::new(Some(installed())));
        assert!(signer.get_public_key().await.unwrap().is_some());

        signer.remove_key(PIN).await.unwrap();
        assert_eq!(signer.get_public_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_key_provisions_envelope() {
        let device = Device::new(None);
        let temp_pubkey = device.temp_secret.x_only_public_key().unwrap();
        let (signer, task) = session(device);

        let secret = scalar(3);
        let secret_hex = secret.to_hex().to_string();
        signer.update_key("4321", &secret_hex).await.unwrap();
        assert_eq!(signer.get_public_key().await.unwrap(), Some(installed()));

        signer.close().await.unwrap();
        let seen = task.await.unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].message_type, MessageType::GetTempPubkey);

        let update = &seen[1];
        assert_eq!(update.message_type, MessageType::UpdateKey);
        assert_eq!(update.pubkey, installed());

        // The device side of the ECDH opens the envelope.
        let conversation_key =
            ConversationKey::derive(&scalar(7), installed().as_bytes()).unwrap();
        let envelope = std::str::from_utf8(&update.payload).unwrap();
        let plaintext = conversation_key.decrypt(envelope).unwrap();
        assert_eq!(
            plaintext,
            format!("{}{}", secret_hex, SessionKey::from_pin("4321").to_hex())
        );

        let host_side = ConversationKey::derive(&secret, &temp_pubkey).unwrap();
        assert_eq!(host_side, conversation_key);
    }

    #[tokio::test]
    async fn test_update_key_rejects_bad_key_before_sending() {
        let (signer, task) = session(Device::new(None));

        let err = signer.update_key("4321", "nsec1invalid").await.unwrap_err();
        assert!(matches!(err, ClientError::Crypto(_)));

        signer.close().await.unwrap();
        assert!(task.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_result_is_typed() {
        let (signer, _device) = session(Device::new(None));
        let err = signer
            .roundtrip(
                MessageType::NostrGetRelays,
                PublicKey::SENTINEL,
                random_iv(),
                Bytes::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::ContentIllegal));
    }

    #[tokio::test]
    async fn test_concurrent_operations_share_session() {
        let (signer, _device) = session(Device::new(Some(installed())));
        let signer = Arc::new(signer);
        let done = Arc::new(AtomicUsize::new(0));

        let mut calls = Vec::new();
        for i in 0..16u8 {
            let signer = signer.clone();
            let done = done.clone();
            calls.push(tokio::spawn(async move {
                let message = format!("message {}", i);
                assert_eq!(signer.echo(PIN, &message).await.unwrap(), message);
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for call in calls {
            call.await.unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_close_stops_session() {
        let (signer, _device) = session(Device::new(None));
        signer.close().await.unwrap();

        assert!(!signer.is_connected());
        let err = signer.ping().await.unwrap_err();
        assert!(matches!(err, ClientError::TransportClosed));
    }
}
