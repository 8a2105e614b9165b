//! Line-oriented communicator transport: `communicate`/`multicomm` over
//! a stream framed by an end-of-line marker, with connection
//! self-healing and identification-on-connect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;

use frappy_core::{SecopError, SecopResult};

use crate::identification::LineIdentEntry;
use crate::opener::{DynStream, Opener};

/// A callback fired exactly once per reconnect, after identification
/// passes. Returning `false` (or panicking — caught and treated as
/// `false`) clears it, matching the "raises or returns false
/// ⇒ deregister" rule.
pub type ReconnectCallback = Box<dyn FnMut() -> bool + Send>;

/// Line-oriented transport state: the possibly-absent open stream plus
/// everything needed to reopen and re-verify it.
pub struct StringIo {
    opener: Arc<dyn Opener>,
    stream: AsyncMutex<Option<BufReader<DynStream>>>,
    timeout: Duration,
    wait_before: Duration,
    eol_write: String,
    eol_read: String,
    identification: Vec<LineIdentEntry>,
    /// Set once a `communicate`/`connect` failure has been observed;
    /// cleared on the reconnect that follows. Gates the reconnect
    /// callback so the very first successful connect at startup does
    /// not spuriously fire it.
    had_error: AtomicBool,
    last_error: SyncMutex<Option<String>>,
    reconnect_callbacks: SyncMutex<Vec<ReconnectCallback>>,
}

impl StringIo {
    #[must_use]
    pub fn new(
        opener: Arc<dyn Opener>,
        timeout: Duration,
        wait_before: Duration,
        eol: &str,
        identification: Vec<LineIdentEntry>,
    ) -> Self {
        StringIo::with_eol(opener, timeout, wait_before, eol, eol, identification)
    }

    /// Construct with distinct read/write terminators, the documented
    /// escape hatch for devices that don't use the same EOL both ways.
    #[must_use]
    pub fn with_eol(
        opener: Arc<dyn Opener>,
        timeout: Duration,
        wait_before: Duration,
        eol_write: &str,
        eol_read: &str,
        identification: Vec<LineIdentEntry>,
    ) -> Self {
        StringIo {
            opener,
            stream: AsyncMutex::new(None),
            timeout,
            wait_before,
            eol_write: eol_write.to_string(),
            eol_read: eol_read.to_string(),
            identification,
            had_error: AtomicBool::new(false),
            last_error: SyncMutex::new(None),
            reconnect_callbacks: SyncMutex::new(Vec::new()),
        }
    }

    pub fn on_reconnect(&self, cb: ReconnectCallback) {
        self.reconnect_callbacks.lock().push(cb);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.try_lock().map(|g| g.is_some()).unwrap_or(true)
    }

    /// The self-healing poll entry point for the synthetic
    /// `is_connected` parameter: if already open, just report so;
    /// otherwise attempt `connect()` and report the outcome.
    pub async fn read_is_connected(&self) -> bool {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return true;
        }
        self.connect_locked(&mut guard).await.is_ok()
    }

    /// Force a (re)connect, verifying identification. Exposed so a
    /// driver can connect eagerly at construction instead of waiting
    /// for the first poll.
    pub async fn connect(&self) -> SecopResult<()> {
        let mut guard = self.stream.lock().await;
        self.connect_locked(&mut guard).await
    }

    async fn connect_locked(&self, guard: &mut Option<BufReader<DynStream>>) -> SecopResult<()> {
        let raw = self
            .opener
            .open()
            .await
            .map_err(|e| SecopError::CommFailed(format!("connect failed: {e}")))?;
        let mut reader = BufReader::new(raw);

        for entry in &self.identification {
            let line = match self.send_recv(&mut reader, &entry.request).await {
                Ok(line) => line,
                Err(e) => return Err(e),
            };
            if !entry.matches(&line) {
                return Err(SecopError::CommFailed(format!(
                    "identification failed: {} did not match expected reply to {:?}",
                    line, entry.request
                )));
            }
        }

        *guard = Some(reader);

        if self.had_error.swap(false, Ordering::SeqCst) {
            let mut callbacks = self.reconnect_callbacks.lock();
            callbacks.retain_mut(|cb| {
                let kept = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb()))
                    .unwrap_or(false);
                kept
            });
        }
        Ok(())
    }

    /// One request/reply exchange on an already-open stream.
    async fn send_recv(&self, reader: &mut BufReader<DynStream>, request: &str) -> SecopResult<String> {
        if !self.wait_before.is_zero() {
            tokio::time::sleep(self.wait_before).await;
        }
        crate::flush_garbage(reader.get_mut(), Duration::from_millis(20)).await;

        let line_out = format!("{request}{}", self.eol_write);
        reader
            .get_mut()
            .write_all(line_out.as_bytes())
            .await
            .map_err(|e| SecopError::CommFailed(format!("write failed: {e}")))?;

        let mut line = String::new();
        let read = tokio::time::timeout(self.timeout, reader.read_line(&mut line)).await;
        match read {
            Ok(Ok(0)) => Err(SecopError::CommFailed("peer closed the connection".to_string())),
            Ok(Ok(_)) => Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
            Ok(Err(e)) => Err(SecopError::CommFailed(format!("read failed: {e}"))),
            Err(_) => Err(SecopError::CommFailed(format!(
                "no reply within {:?}",
                self.timeout
            ))),
        }
    }

    /// Send one request, wait for the reply. Holds the transport lock
    /// for the duration of the call; drops the stream on any failure so
    /// the next call (or the self-healing poll) re-establishes it.
    pub async fn communicate(&self, request: &str) -> SecopResult<String> {
        let mut guard = self.stream.lock().await;
        self.run_locked(&mut guard, request).await
    }

    /// Send several requests over one held lock, in order, each waiting
    /// `wait_before` after the previous reply — the request-joining
    /// discipline `multicomm` guarantees by holding the
    /// same lock `communicate` uses across every sub-call. Implemented
    /// as repeated calls to the lock-already-held inner helper rather
    /// than recursive calls to `communicate`, which sidesteps needing a
    /// genuinely reentrant async mutex.
    pub async fn multicomm(&self, requests: &[&str]) -> SecopResult<Vec<String>> {
        let mut guard = self.stream.lock().await;
        let mut replies = Vec::with_capacity(requests.len());
        for request in requests {
            replies.push(self.run_locked(&mut guard, request).await?);
        }
        Ok(replies)
    }

    async fn run_locked(&self, guard: &mut Option<BufReader<DynStream>>, request: &str) -> SecopResult<String> {
        if guard.is_none() {
            self.connect_locked(guard).await.map_err(|e| self.note_error(e))?;
        }
        let reader = guard.as_mut().expect("just connected");
        match self.send_recv(reader, request).await {
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

    /// Log-once-then-suppress dedup: an identical repeated error message
    /// is not re-logged, a new one is. Always marks `had_error` so the
    /// next successful connect fires reconnect callbacks.
    fn note_error(&self, err: SecopError) -> SecopError {
        self.had_error.store(true, Ordering::SeqCst);
        let rendered = err.to_string();
        let mut last = self.last_error.lock();
        if last.as_deref() != Some(rendered.as_str()) {
            tracing::warn!(error = %rendered, "stream I/O error");
            *last = Some(rendered);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opener::ScriptedOpener;

    fn duplex_pair() -> (tokio::io::DuplexStream, DynStream) {
        let (host, device) = tokio::io::duplex(256);
        (host, Box::new(device))
    }

    #[tokio::test]
    async fn communicate_round_trips_a_request() {
        let (mut host, device) = duplex_pair();
        let opener = Arc::new(ScriptedOpener::new(vec![Ok(device)]));
        let io = StringIo::new(opener, Duration::from_millis(200), Duration::ZERO, "\n", vec![]);

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = tokio::io::AsyncReadExt::read(&mut host, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"*IDN?\n");
            tokio::io::AsyncWriteExt::write_all(&mut host, b"FRAPPY,demo\n").await.unwrap();
        });

        let reply = io.communicate("*IDN?").await.unwrap();
        assert_eq!(reply, "FRAPPY,demo");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn failed_identification_keeps_connection_down() {
        let (mut host, device) = duplex_pair();
        let opener = Arc::new(ScriptedOpener::new(vec![Ok(device)]));
        let ident = vec![LineIdentEntry::new("*IDN?", r"^EXPECTED").unwrap()];
        let io = StringIo::new(opener, Duration::from_millis(200), Duration::ZERO, "\n", ident);

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = tokio::io::AsyncReadExt::read(&mut host, &mut buf).await;
            tokio::io::AsyncWriteExt::write_all(&mut host, b"WRONG\n").await.unwrap();
        });

        let err = io.communicate("*IDN?").await.unwrap_err();
        assert!(matches!(err, SecopError::CommFailed(_)));
        assert!(!io.is_connected());
    }

    #[tokio::test]
    async fn reconnect_callback_fires_once_after_a_failure_not_on_first_connect() {
        let (_host1, device1) = duplex_pair();
        let (mut host2, device2) = duplex_pair();
        let opener = Arc::new(ScriptedOpener::new(vec![Ok(device1), Ok(device2)]));
        let io = StringIo::new(opener, Duration::from_millis(100), Duration::ZERO, "\n", vec![]);

        io.connect().await.unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        io.on_reconnect(Box::new(move || {
            fired_clone.store(true, Ordering::SeqCst);
            true
        }));

        drop(_host1);
        let _ = io.communicate("ping").await;
        assert!(!fired.load(Ordering::SeqCst), "must not fire on first connect's drop");

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = tokio::io::AsyncReadExt::read(&mut host2, &mut buf).await;
            tokio::io::AsyncWriteExt::write_all(&mut host2, b"ok\n").await.unwrap();
        });
        io.communicate("ping").await.unwrap();
        responder.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }
}
