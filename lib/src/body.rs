//! Body buffers and the streams that read and write them.

use {
    crate::error::Error,
    bytes::{Bytes, BytesMut},
    std::sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// The most bytes a single stream read hands back to the guest.
pub const MAX_READ_CHUNK: u64 = 64 * 1024;

/// The write budget reported by `check-write`. Writes are buffered, so this only bounds the size
/// of a single guest call.
pub const WRITE_PERMIT: u64 = 64 * 1024;

#[derive(Debug, Default)]
struct BodyState {
    bytes: BytesMut,
    finished: bool,
}

/// An append-only body buffer shared between an outgoing message, its body handle, and any output
/// streams opened on that body.
///
/// A buffer starts out pending and becomes finished exactly once. After that, it no longer accepts
/// bytes.
#[derive(Clone, Debug, Default)]
pub struct BodyBuffer(Arc<Mutex<BodyState>>);

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BodyState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `bytes`, returning how many were accepted.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, Error> {
        let mut state = self.lock();
        if state.finished {
            return Err(Error::BodyAlreadyFinished);
        }
        state.bytes.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Mark the body as complete.
    pub fn finish(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if state.finished {
            return Err(Error::BodyAlreadyFinished);
        }
        state.finished = true;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of everything written so far.
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().bytes)
    }
}

/// The state a stream reports alongside each read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum StreamStatus {
    Open = 0,
    Ended = 1,
}

/// A read cursor over immutable bytes.
#[derive(Debug)]
pub struct InputStream {
    bytes: Bytes,
}

impl InputStream {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Read up to `len` bytes, never more than [`MAX_READ_CHUNK`].
    ///
    /// The status is [`StreamStatus::Ended`] once the returned chunk leaves nothing behind it.
    pub fn read(&mut self, len: u64) -> (Bytes, StreamStatus) {
        let (chunk, status) = self.peek(len);
        self.advance(chunk.len());
        (chunk, status)
    }

    /// Like [`InputStream::read`], but leaves the cursor where it is.
    pub fn peek(&self, len: u64) -> (Bytes, StreamStatus) {
        let len = len.min(MAX_READ_CHUNK).min(self.bytes.len() as u64) as usize;
        let status = if len == self.bytes.len() {
            StreamStatus::Ended
        } else {
            StreamStatus::Open
        };
        (self.bytes.slice(..len), status)
    }

    /// Move the cursor past `n` bytes, or to the end.
    pub fn advance(&mut self, n: usize) {
        let _ = self.bytes.split_to(n.min(self.bytes.len()));
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }
}

/// An entry in the stream table.
#[derive(Debug)]
pub enum StreamEntry {
    Input(InputStream),
    Output(BodyBuffer),
}
