//! Line- and byte-oriented stream transports for communicator modules:
//! the collaborator contract device drivers depend on, with connection
//! self-healing, per-call locking discipline, and peer identification
//! on (re)connect.

pub mod byte_io;
pub mod identification;
pub mod line_io;
pub mod opener;

pub use byte_io::{ByteIo, ReplyLengthHook};
pub use identification::{ByteIdentEntry, LineIdentEntry};
pub use line_io::{ReconnectCallback, StringIo};
pub use opener::{AsyncReadWrite, DynStream, Opener, ScriptedOpener};

use std::time::Duration;

use tokio::io::AsyncReadExt;

/// Aggressively read and discard whatever is immediately available,
/// for up to `timeout`, before sending a new request — the "flush
/// incoming garbage once" step of the per-call discipline.
pub(crate) async fn flush_garbage<R: AsyncReadExt + Unpin>(port: &mut R, timeout: Duration) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + timeout;
    let mut total = 0usize;
    loop {
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => total += n,
        }
    }
    total
}
