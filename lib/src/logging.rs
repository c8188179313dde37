use {
    lazy_static::lazy_static,
    std::{
        io::{self, Write},
        sync::{Mutex, PoisonError},
    },
};

/// A logging endpoint, which for the bridge is just a name.
///
/// Guest output sent through `log-it` is written here, under the name [`LogEndpoint::GUEST`].
pub struct LogEndpoint(Vec<u8>);

lazy_static! {
    /// The underlying writer to use for all log messages. It defaults to `stdout`,
    /// but can be redirected for tests. We make this a static, rather than e.g.
    /// a field in `Session`, because the `Write` implementation for `LogEndpoint`
    /// doesn't have direct access to context data.
    pub static ref LOG_WRITER: Mutex<Box<dyn Write + Send>> = Mutex::new(Box::new(io::stdout()));
}

impl LogEndpoint {
    /// The endpoint name used for guest debug output.
    pub const GUEST: &'static [u8] = b"guest";

    /// Allocate a new `LogEndpoint` with the given name.
    pub fn new(name: &[u8]) -> LogEndpoint {
        LogEndpoint(name.to_owned())
    }

    /// The endpoint for guest debug output.
    pub fn guest() -> LogEndpoint {
        Self::new(Self::GUEST)
    }

    /// Format a log entry, or return `None` if there is nothing to write.
    ///
    /// Entries are prefixed with the endpoint name and terminated with a newline. Any interior
    /// newlines in the message are escaped to the string r"\n".
    fn format_entry(&self, mut msg: &[u8]) -> Option<Vec<u8>> {
        const LOG_ENDPOINT_DELIM: &[u8] = b" :: ";

        // Strip any trailing newline; we add our own at the end.
        if msg.last() == Some(&b'\n') {
            msg = &msg[..msg.len() - 1];
        }

        if msg.is_empty() {
            return None;
        }

        let mut entry =
            Vec::with_capacity(msg.len() + self.0.len() + LOG_ENDPOINT_DELIM.len() + 1);
        entry.extend_from_slice(&self.0);
        entry.extend_from_slice(LOG_ENDPOINT_DELIM);
        for &byte in msg {
            if byte == b'\n' {
                entry.extend_from_slice(br"\n");
            } else {
                entry.push(byte);
            }
        }
        entry.push(b'\n');
        Some(entry)
    }

    /// Write a log entry to this endpoint.
    ///
    /// The entry is written atomically to `LOG_WRITER`.
    pub fn write_entry(&self, msg: &[u8]) -> io::Result<()> {
        match self.format_entry(msg) {
            Some(entry) => LOG_WRITER
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(&entry),
            None => Ok(()),
        }
    }
}

impl Write for LogEndpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_entry(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        LOG_WRITER
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}
