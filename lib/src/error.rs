//! Error types.

use {
    crate::handles::{
        BodyHandle, FieldsHandle, OutparamHandle, RequestHandle, ResponseHandle, StreamHandle,
    },
    std::io,
};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error when the bridge has been given an invalid file.
    #[error("Expected a valid Wasm file")]
    FileFormat,

    #[error(transparent)]
    BridgeConfig(#[from] BridgeConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    HandleError(#[from] HandleError),

    #[error(transparent)]
    HyperError(#[from] hyper::Error),

    #[error(transparent)]
    HttpError(#[from] http::Error),

    /// Error when an invalid argument is supplied to a hostcall.
    #[error("Invalid argument given")]
    InvalidArgument,

    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error(transparent)]
    InvalidMethod(#[from] http::method::InvalidMethod),

    #[error(transparent)]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),

    #[error(transparent)]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// A guest-supplied pointer or length could not be honored.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// The access-control policy rejected an outgoing request.
    #[error("{what} not allowed: ({value})")]
    PolicyRefused { what: &'static str, value: String },

    /// The native HTTP call failed or timed out.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unsupported operation: {msg}")]
    Unsupported { msg: &'static str },

    /// A response outparam was completed a second time.
    #[error("Response outparam already set")]
    OutparamAlreadySet,

    /// An outgoing body was written to or finished after it was finished.
    #[error("Outgoing body already finished")]
    BodyAlreadyFinished,

    #[error("Could not load native certificates: {0}")]
    BadCerts(std::io::Error),
}

/// Classification of an [`Error`] at the guest boundary.
///
/// Every kind is reported to the guest through the same zero/empty result; the kind only shows
/// up in host-side logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceNotFound,
    PolicyRefused,
    MemoryBounds,
    TransportFailure,
    ProtocolMisuse,
    Unsupported,
    InvalidArgument,
    Other,
}

impl Error {
    /// Classify this error for reporting across the ABI boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::HandleError(_) => ErrorKind::ResourceNotFound,
            Error::PolicyRefused { .. } => ErrorKind::PolicyRefused,
            Error::Memory(e) => e.kind(),
            Error::Transport(_) | Error::HyperError(_) => ErrorKind::TransportFailure,
            Error::OutparamAlreadySet | Error::BodyAlreadyFinished => ErrorKind::ProtocolMisuse,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::InvalidArgument
            | Error::InvalidHeaderName(_)
            | Error::InvalidHeaderValue(_)
            | Error::InvalidMethod(_)
            | Error::InvalidStatusCode(_)
            | Error::InvalidUri(_)
            | Error::HttpError(_) => ErrorKind::InvalidArgument,
            // All other errors are host-side failures.
            Error::FileFormat
            | Error::BridgeConfig(_)
            | Error::Execution(_)
            | Error::IoError(_)
            | Error::Other(_)
            | Error::BadCerts(_) => ErrorKind::Other,
        }
    }
}

/// Errors thrown due to an invalid resource handle of some kind.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// A fields handle was not valid.
    #[error("Invalid fields handle: {0}")]
    InvalidFieldsHandle(FieldsHandle),

    /// A request handle was not valid.
    #[error("Invalid request handle: {0}")]
    InvalidRequestHandle(RequestHandle),

    /// A response handle was not valid.
    #[error("Invalid response handle: {0}")]
    InvalidResponseHandle(ResponseHandle),

    /// A body handle was not valid.
    #[error("Invalid body handle: {0}")]
    InvalidBodyHandle(BodyHandle),

    /// A stream handle was not valid.
    #[error("Invalid stream handle: {0}")]
    InvalidStreamHandle(StreamHandle),

    /// A response outparam handle was not valid.
    #[error("Invalid response outparam handle: {0}")]
    InvalidOutparamHandle(OutparamHandle),
}

/// Errors raised while reading from or writing to guest linear memory.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("out of bounds memory access: offset {offset}, length {len}, memory size {size}")]
    OutOfBounds { offset: u32, len: u64, size: usize },

    #[error("guest string is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("guest does not export a memory named `memory`")]
    MissingMemory,

    #[error("guest does not export `cabi_realloc`")]
    MissingAllocator,
}

impl MemoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::OutOfBounds { .. } => ErrorKind::MemoryBounds,
            MemoryError::InvalidUtf8(_) => ErrorKind::InvalidArgument,
            MemoryError::MissingMemory | MemoryError::MissingAllocator => ErrorKind::Other,
        }
    }
}

/// Errors that may occur while running a guest.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Errors thrown by the guest's entrypoint.
    ///
    /// See [`wasmtime::Func::call`][call] for more information.
    ///
    /// [call]: https://docs.rs/wasmtime/latest/wasmtime/struct.Func.html#method.call
    #[error("WebAssembly execution trapped: {0}")]
    WasmTrap(anyhow::Error),

    /// Errors thrown when type-checking WebAssembly before instantiation
    #[error("Error type-checking WebAssembly instantiation: {0}")]
    Typechecking(anyhow::Error),

    /// Errors thrown when trying to instantiate a guest module.
    #[error("Error instantiating WebAssembly: {0}")]
    Instantiation(anyhow::Error),

    /// The guest returned from its handler without setting the response outparam.
    #[error("guest did not set a response")]
    MissingResponse,

    /// The guest set the response outparam to an error.
    #[error("guest responded with an error: {0}")]
    GuestError(String),
}

/// Errors that can occur while parsing a bridge configuration file.
#[derive(Debug, thiserror::Error)]
pub enum BridgeConfigError {
    /// An I/O error that occurred while reading the file.
    #[error("error reading '{path}': {err}")]
    IoError {
        path: String,
        #[source]
        err: io::Error,
    },

    #[error("invalid configuration for 'http': {0}")]
    InvalidHttpDefinition(#[from] HttpConfigError),

    /// An error that occurred while deserializing the file.
    ///
    /// This represents errors caused by syntactically invalid TOML data, missing fields, etc.
    #[error("error parsing configuration: {0}")]
    InvalidToml(#[from] toml::de::Error),
}

/// Errors that may occur while validating the `[http]` section.
#[derive(Debug, thiserror::Error)]
pub enum HttpConfigError {
    #[error("definition was not provided as a TOML table")]
    InvalidEntryType,

    #[error("'allowed_hosts' was not an array of strings")]
    InvalidHostsEntry,

    #[error("'allowed_hosts' contains an empty entry")]
    EmptyHost,

    #[error("'allowed_methods' was not an array of strings")]
    InvalidMethodsEntry,

    #[error("'allowed_methods' contains an empty entry")]
    EmptyMethod,

    #[error("'timeout_ms' was not a positive integer")]
    InvalidTimeoutEntry,

    #[error("unrecognized key '{0}'")]
    UnrecognizedKey(String),
}
