//! Byte-oriented communicator transport: fixed or data-dependent reply
//! lengths instead of a line terminator, for binary protocols.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use frappy_core::{SecopError, SecopResult};

use crate::identification::ByteIdentEntry;
use crate::opener::{DynStream, Opener};

/// Computes the *total* reply length once the header bytes are in hand,
/// for protocols where the payload length is itself data (e.g. a
/// length-prefixed frame). Given the already-read header, return how
/// many more bytes to read, or an error if the header is malformed.
pub trait ReplyLengthHook: Send + Sync {
    fn full_length(&self, header: &[u8]) -> SecopResult<usize>;
}

/// Byte-oriented transport state, the counterpart of [`crate::StringIo`]
/// for devices that frame replies by length rather than terminator.
pub struct ByteIo {
    opener: Arc<dyn Opener>,
    stream: AsyncMutex<Option<DynStream>>,
    timeout: Duration,
    wait_before: Duration,
    min_reply_len: usize,
    identification: Vec<ByteIdentEntry>,
    had_error: AtomicBool,
    last_error: SyncMutex<Option<String>>,
}

impl ByteIo {
    #[must_use]
    pub fn new(
        opener: Arc<dyn Opener>,
        timeout: Duration,
        wait_before: Duration,
        min_reply_len: usize,
        identification: Vec<ByteIdentEntry>,
    ) -> Self {
        ByteIo {
            opener,
            stream: AsyncMutex::new(None),
            timeout,
            wait_before,
            min_reply_len,
            identification,
            had_error: AtomicBool::new(false),
            last_error: SyncMutex::new(None),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.try_lock().map(|g| g.is_some()).unwrap_or(true)
    }

    pub async fn read_is_connected(&self) -> bool {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return true;
        }
        self.connect_locked(&mut guard).await.is_ok()
    }

    pub async fn connect(&self) -> SecopResult<()> {
        let mut guard = self.stream.lock().await;
        self.connect_locked(&mut guard).await
    }

    async fn connect_locked(&self, guard: &mut Option<DynStream>) -> SecopResult<()> {
        let mut raw = self
            .opener
            .open()
            .await
            .map_err(|e| SecopError::CommFailed(format!("connect failed: {e}")))?;

        for entry in &self.identification {
            let reply = self
                .exchange(&mut raw, &entry.request, self.min_reply_len.max(entry.request.len()))
                .await?;
            if !entry.matches(&reply) {
                return Err(SecopError::CommFailed(
                    "identification failed: reply did not match expected byte pattern".to_string(),
                ));
            }
        }

        *guard = Some(raw);
        self.had_error.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn exchange(&self, stream: &mut DynStream, request: &[u8], reply_len: usize) -> SecopResult<Vec<u8>> {
        if !self.wait_before.is_zero() {
            tokio::time::sleep(self.wait_before).await;
        }
        crate::flush_garbage(stream.as_mut(), Duration::from_millis(20)).await;

        stream
            .write_all(request)
            .await
            .map_err(|e| SecopError::CommFailed(format!("write failed: {e}")))?;

        let mut buf = vec![0u8; reply_len];
        tokio::time::timeout(self.timeout, stream.read_exact(&mut buf))
            .await
            .map_err(|_| SecopError::CommFailed(format!("no reply within {:?}", self.timeout)))?
            .map_err(|e| SecopError::CommFailed(format!("read failed: {e}")))?;
        Ok(buf)
    }

    /// Read a variable-length reply: first `min_reply_len` (or the
    /// header's own declared size, whichever the caller passes) bytes
    /// are read up front, then `hook` decides how many more to pull in.
    pub async fn get_full_reply(&self, request: &[u8], header_len: usize, hook: &dyn ReplyLengthHook) -> SecopResult<Vec<u8>> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            self.connect_locked(&mut guard).await.map_err(|e| self.note_error(e))?;
        }
        let stream = guard.as_mut().expect("just connected");

        if !self.wait_before.is_zero() {
            tokio::time::sleep(self.wait_before).await;
        }
        stream
            .write_all(request)
            .await
            .map_err(|e| SecopError::CommFailed(format!("write failed: {e}")))?;

        let mut header = vec![0u8; header_len];
        let read_header = tokio::time::timeout(self.timeout, stream.read_exact(&mut header)).await;
        let header = match read_header {
            Ok(Ok(())) => header,
            Ok(Err(e)) => {
                *guard = None;
                return Err(self.note_error(SecopError::CommFailed(format!("read failed: {e}"))));
            }
            Err(_) => {
                *guard = None;
                return Err(self.note_error(SecopError::CommFailed("no reply within timeout".to_string())));
            }
        };

        let remaining = hook.full_length(&header)?.saturating_sub(header_len);
        let mut rest = vec![0u8; remaining];
        if remaining > 0 {
            if let Err(e) = tokio::time::timeout(self.timeout, stream.read_exact(&mut rest)).await {
                *guard = None;
                return Err(self.note_error(SecopError::CommFailed(format!("timed out reading remainder: {e}"))));
            }
        }

        self.last_error.lock().take();
        let mut full = header;
        full.extend(rest);
        Ok(full)
    }

    /// Fixed-length request/reply exchange.
    pub async fn communicate(&self, request: &[u8]) -> SecopResult<Vec<u8>> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            self.connect_locked(&mut guard).await.map_err(|e| self.note_error(e))?;
        }
        let stream = guard.as_mut().expect("just connected");
        match self.exchange(stream, request, self.min_reply_len).await {
            Ok(reply) => {
                self.last_error.lock().take();
                Ok(reply)
            }
            Err(e) => {
                *guard = None;
                Err(self.note_error(e))
            }
        }
    }

    fn note_error(&self, err: SecopError) -> SecopError {
        self.had_error.store(true, Ordering::SeqCst);
        let rendered = err.to_string();
        let mut last = self.last_error.lock();
        if last.as_deref() != Some(rendered.as_str()) {
            tracing::warn!(error = %rendered, "byte stream I/O error");
            *last = Some(rendered);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opener::ScriptedOpener;

    struct FixedLength(usize);
    impl ReplyLengthHook for FixedLength {
        fn full_length(&self, _header: &[u8]) -> SecopResult<usize> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn communicate_reads_fixed_length_reply() {
        let (mut host, device) = tokio::io::duplex(64);
        let opener = Arc::new(ScriptedOpener::new(vec![Ok(Box::new(device))]));
        let io = ByteIo::new(opener, Duration::from_millis(200), Duration::ZERO, 4, vec![]);

        tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let n = host.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"\x01\x02");
            host.write_all(b"\xAA\xBB\xCC\xDD").await.unwrap();
        });

        let reply = io.communicate(b"\x01\x02").await.unwrap();
        assert_eq!(reply, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn full_reply_hook_reads_header_then_remainder() {
        let (mut host, device) = tokio::io::duplex(64);
        let opener = Arc::new(ScriptedOpener::new(vec![Ok(Box::new(device))]));
        let io = ByteIo::new(opener, Duration::from_millis(200), Duration::ZERO, 2, vec![]);

        tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let _ = host.read(&mut buf).await.unwrap();
            host.write_all(&[0x00, 0x03]).await.unwrap();
            host.write_all(&[0x01, 0x02, 0x03]).await.unwrap();
        });

        let reply = io.get_full_reply(b"Q", 2, &FixedLength(5)).await.unwrap();
        assert_eq!(reply, vec![0x00, 0x03, 0x01, 0x02, 0x03]);
    }
}
