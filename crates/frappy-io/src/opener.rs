//! The type-erased async transport a communicator module reconnects
//! through, the direct successor of `daq_core::serial::{DynSerial,
//! SerialPortIO}`: any `AsyncRead + AsyncWrite` stream can stand in for
//! the real wire, including a `tokio::io::duplex` pair in tests.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Blanket-implemented for every stream usable as a SECoP transport.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

/// A type-erased, already-open stream.
pub type DynStream = Box<dyn AsyncReadWrite>;

/// Knows how to (re-)establish the transport named by a communicator's
/// `uri` property. Implemented once per transport kind (TCP, serial,
/// in-process mock); `StringIo`/`ByteIo` call it every time `connect()`
/// is needed, whether at startup or after a detected drop.
#[async_trait]
pub trait Opener: Send + Sync {
    /// Open a fresh stream, or fail with the reason the attempt didn't
    /// work (host unreachable, port busy, ...).
    async fn open(&self) -> io::Result<DynStream>;
}

/// An `Opener` that always returns streams supplied up front, useful for
/// tests that want to script a sequence of connect outcomes (e.g. "first
/// open succeeds, connection then dies, second open succeeds again").
pub struct ScriptedOpener {
    streams: parking_lot::Mutex<std::collections::VecDeque<io::Result<DynStream>>>,
}

impl ScriptedOpener {
    #[must_use]
    pub fn new(streams: Vec<io::Result<DynStream>>) -> Self {
        ScriptedOpener {
            streams: parking_lot::Mutex::new(streams.into()),
        }
    }
}

#[async_trait]
impl Opener for ScriptedOpener {
    async fn open(&self) -> io::Result<DynStream> {
        self.streams
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::NotConnected, "no more scripted streams")))
    }
}
