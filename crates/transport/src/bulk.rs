//! Bulk file channel.
//!
//! A transfer is a single connection carrying a 10 byte ASCII decimal length header,
//! right padded with `:`, followed by exactly that many payload bytes written in
//! [CHUNK_SIZE] chunks. Every [TransferClass] listens on its own port and owns a
//! receive lock, so at most one payload per class is in flight on a node. The lock is
//! carried by the delivered [Transfer] and released when the consumer drops it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use bytes::BytesMut;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::error::Error;
use crate::error::Result;

/// Width of the length header.
pub const HEADER_LEN: usize = 10;
/// Payload chunk size.
pub const CHUNK_SIZE: usize = 1024;
/// Default bound on dialing a bulk receiver.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(20);
/// Default bound on moving one payload across the wire.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

const HEADER_PAD: u8 = b':';

/// The flows sharing the bulk channel. Each one uses a distinct port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferClass {
    /// Single entry pushed to the successor after a local write.
    Replication,
    /// Full export walking the ring during reconciliation.
    Reconciliation,
    /// Full export handed over on join or leave.
    Migration,
}

impl TransferClass {
    /// All classes, in port-declaration order.
    pub const ALL: [TransferClass; 3] = [
        TransferClass::Replication,
        TransferClass::Reconciliation,
        TransferClass::Migration,
    ];

    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferClass::Replication => "replication",
            TransferClass::Reconciliation => "reconciliation",
            TransferClass::Migration => "migration",
        }
    }
}

impl fmt::Display for TransferClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render the length header for a payload of `len` bytes.
pub fn encode_header(len: usize) -> Result<[u8; HEADER_LEN]> {
    let digits = len.to_string();
    if digits.len() > HEADER_LEN {
        return Err(Error::PayloadTooLarge(len));
    }
    let mut header = [HEADER_PAD; HEADER_LEN];
    header[..digits.len()].copy_from_slice(digits.as_bytes());
    Ok(header)
}

/// Parse a length header.
pub fn decode_header(header: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| Error::InvalidHeader(format!("{:?}", header)))?;
    text.trim_matches(HEADER_PAD as char)
        .parse::<usize>()
        .map_err(|_| Error::InvalidHeader(text.to_string()))
}

/// Write header and payload to `writer`.
pub async fn write_payload<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where W: AsyncWrite + Unpin {
    writer.write_all(&encode_header(payload.len())?).await?;
    for chunk in payload.chunks(CHUNK_SIZE) {
        writer.write_all(chunk).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read a header, then exactly the announced number of bytes.
pub async fn read_payload<R>(reader: &mut R) -> Result<Bytes>
where R: AsyncRead + Unpin {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = decode_header(&header)?;

    let mut payload = BytesMut::with_capacity(len);
    let mut chunk = [0u8; CHUNK_SIZE];
    while payload.len() < len {
        let want = CHUNK_SIZE.min(len - payload.len());
        reader.read_exact(&mut chunk[..want]).await?;
        payload.extend_from_slice(&chunk[..want]);
    }
    Ok(payload.freeze())
}

/// Dials bulk receivers and streams payloads to them.
#[derive(Clone, Debug)]
pub struct BulkSender {
    dial_timeout: Duration,
    transfer_timeout: Duration,
}

impl Default for BulkSender {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT)
    }
}

impl BulkSender {
    /// Create a sender with explicit timeouts.
    pub fn new(dial_timeout: Duration, transfer_timeout: Duration) -> Self {
        Self {
            dial_timeout,
            transfer_timeout,
        }
    }

    /// Send one payload to the receiver listening on `address`.
    pub async fn send(&self, address: &str, class: TransferClass, payload: &[u8]) -> Result<()> {
        let mut stream = tokio::time::timeout(self.dial_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::TransferTimeout(format!("dial {} ({})", address, class)))?
            .map_err(|e| Error::unreachable(address, e))?;

        tracing::debug!("sending {} bytes of {} to {}", payload.len(), class, address);
        tokio::time::timeout(self.transfer_timeout, write_payload(&mut stream, payload))
            .await
            .map_err(|_| Error::TransferTimeout(format!("write {} ({})", address, class)))??;
        stream.shutdown().await?;
        Ok(())
    }
}

/// A payload delivered by a [BulkReceiver].
///
/// The class receive lock stays held until this value is dropped.
pub struct Transfer {
    /// Class the payload arrived on.
    pub class: TransferClass,
    /// Raw payload bytes.
    pub payload: Bytes,
    _guard: OwnedMutexGuard<()>,
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("class", &self.class)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Accepts transfers of one class and forwards them to a consumer channel.
pub struct BulkReceiver {
    class: TransferClass,
    lock: Arc<Mutex<()>>,
    transfer_timeout: Duration,
}

impl BulkReceiver {
    /// Create a receiver guarded by `lock`.
    pub fn new(class: TransferClass, lock: Arc<Mutex<()>>) -> Self {
        Self {
            class,
            lock,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }

    /// Override the per-transfer read timeout.
    pub fn with_timeout(mut self, transfer_timeout: Duration) -> Self {
        self.transfer_timeout = transfer_timeout;
        self
    }

    /// Accept transfers until the consumer side of `tx` goes away.
    pub async fn run(self, listener: TcpListener, tx: mpsc::Sender<Transfer>) {
        tracing::info!("started {} listening service", self.class);
        loop {
            let (mut stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("{} accept error: {}", self.class, e);
                    continue;
                }
            };

            let guard = self.lock.clone().lock_owned().await;
            tracing::info!("a node wants to send a {} payload: {}", self.class, peer);
            let payload =
                match tokio::time::timeout(self.transfer_timeout, read_payload(&mut stream)).await {
                    Ok(Ok(payload)) => payload,
                    Ok(Err(e)) => {
                        tracing::error!("failed to receive {} payload from {}: {}", self.class, peer, e);
                        continue;
                    }
                    Err(_) => {
                        tracing::error!("{} transfer from {} timed out", self.class, peer);
                        continue;
                    }
                };

            tracing::debug!("{} payload received correctly, {} bytes", self.class, payload.len());
            let transfer = Transfer {
                class: self.class,
                payload,
                _guard: guard,
            };
            if tx.send(transfer).await.is_err() {
                tracing::warn!("{} consumer is gone, receiver stops", self.class);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_colon_padded() {
        assert_eq!(&encode_header(42).unwrap(), b"42::::::::");
        assert_eq!(&encode_header(0).unwrap(), b"0:::::::::");
        assert_eq!(&encode_header(9_999_999_999).unwrap(), b"9999999999");
        assert!(matches!(
            encode_header(10_000_000_000),
            Err(Error::PayloadTooLarge(_))
        ));

        assert_eq!(decode_header(b"42::::::::").unwrap(), 42);
        assert_eq!(decode_header(b"1234567890").unwrap(), 1234567890);
        assert!(decode_header(b"4x::::::::").is_err());
        assert!(decode_header(b"::::::::::").is_err());
    }

    #[tokio::test]
    async fn test_payload_spanning_many_chunks() -> Result<()> {
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let (mut a, mut b) = tokio::io::duplex(CHUNK_SIZE);

        let sent = payload.clone();
        let writer = tokio::spawn(async move { write_payload(&mut a, &sent).await });
        let received = read_payload(&mut b).await?;
        writer.await.unwrap()?;

        assert_eq!(received.as_ref(), payload.as_slice());
        Ok(())
    }

    #[tokio::test]
    async fn test_receiver_serializes_transfers() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let (tx, mut rx) = mpsc::channel(4);
        let lock = Arc::new(Mutex::new(()));
        tokio::spawn(BulkReceiver::new(TransferClass::Migration, lock.clone()).run(listener, tx));

        let sender = BulkSender::default();
        sender.send(&addr, TransferClass::Migration, b"first").await?;
        sender.send(&addr, TransferClass::Migration, b"second").await?;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.payload.as_ref(), b"first");
        assert!(lock.try_lock().is_err());

        // the second payload waits for the first to be consumed
        let pending = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(pending.is_err());

        drop(first);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.class, TransferClass::Migration);
        assert_eq!(second.payload.as_ref(), b"second");
        Ok(())
    }
}
