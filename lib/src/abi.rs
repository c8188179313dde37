//! Guest-facing hostcall registration.
//!
//! Every hostcall takes and returns plain `i32`/`i64` values. Resources are passed as handles,
//! strings and lists as `(pointer, length)` pairs into the guest's linear memory, and compound
//! results are written to a guest-supplied result area as little-endian words. A hostcall never
//! traps on a bad argument: failures are logged and reported through the zero handle or the
//! error arm of the result area.

mod handler_impl;
mod streams_impl;
mod types_impl;

use {
    crate::{
        error::{Error, ErrorKind, MemoryError},
        memory,
        session::Session,
    },
    tracing::{event, Level},
    wasmtime::{Caller, Extern, Linker, Memory},
};

/// The module exporting the HTTP resource types.
pub const TYPES_MODULE: &str = "wasi:http/types@0.2.0-rc-2023-10-18";

/// The module exporting the outgoing request handler.
pub const OUTGOING_HANDLER_MODULE: &str = "default-outgoing-HTTP";

/// The module exporting byte streams over request and response bodies.
pub const STREAMS_MODULE: &str = "wasi:io/streams@0.2.0-rc-2023-10-18";

/// Link every bridge hostcall into `linker`.
///
/// `get_cx` projects the store's data onto the [`Session`] whose tables the guest's handles
/// refer to. Registration is the only fallible step; once linked, hostcalls report failures to
/// the guest instead of trapping.
pub fn add_to_linker<T, U>(linker: &mut Linker<T>, get_cx: U) -> Result<(), Error>
where
    T: Send + 'static,
    U: Fn(&mut T) -> &mut Session + Copy + Send + Sync + 'static,
{
    types_impl::add_to_linker(linker, get_cx)?;
    handler_impl::add_to_linker(linker, get_cx)?;
    streams_impl::add_to_linker(linker, get_cx)?;
    Ok(())
}

/// Look up the guest's exported linear memory.
fn guest_memory<T>(caller: &mut Caller<'_, T>) -> Result<Memory, MemoryError> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or(MemoryError::MissingMemory)
}

/// Borrow the guest's memory and the session at once.
fn memory_and_session<'a, T, U>(
    caller: &'a mut Caller<'_, T>,
    get_cx: U,
) -> Result<(&'a mut [u8], &'a mut Session), MemoryError>
where
    U: Fn(&mut T) -> &mut Session,
{
    let mem = guest_memory(caller)?;
    let (data, store) = mem.data_and_store_mut(caller);
    Ok((data, get_cx(store)))
}

/// Allocate `size` bytes in guest memory through the guest's exported `cabi_realloc`.
async fn guest_alloc<T: Send>(
    caller: &mut Caller<'_, T>,
    size: u32,
    align: u32,
) -> Result<u32, Error> {
    if size == 0 {
        return Ok(0);
    }
    let realloc = caller
        .get_export("cabi_realloc")
        .and_then(Extern::into_func)
        .ok_or(MemoryError::MissingAllocator)?
        .typed::<(u32, u32, u32, u32), u32>(&*caller)
        .map_err(|_| MemoryError::MissingAllocator)?;
    Ok(realloc.call_async(&mut *caller, (0, 0, align, size)).await?)
}

/// Copy `bytes` into a fresh guest allocation, returning its address.
async fn copy_to_guest<T: Send>(caller: &mut Caller<'_, T>, bytes: &[u8]) -> Result<u32, Error> {
    let len = u32::try_from(bytes.len()).map_err(|_| Error::InvalidArgument)?;
    let ptr = guest_alloc(caller, len, 1).await?;
    let mem = guest_memory(caller)?;
    memory::write_bytes(mem.data_mut(&mut *caller), ptr, bytes)?;
    Ok(ptr)
}

/// Write little-endian words to the result area at `out`.
fn write_out<T>(caller: &mut Caller<'_, T>, out: u32, words: &[u32]) -> Result<(), Error> {
    let mem = guest_memory(caller)?;
    memory::write_words(mem.data_mut(caller), out, words)?;
    Ok(())
}

/// Log a failed hostcall. Every failure reaches the guest the same way, so the log is the only
/// place the cause shows up.
fn log_failure(hostcall: &'static str, err: &Error) {
    match err.kind() {
        ErrorKind::PolicyRefused | ErrorKind::TransportFailure | ErrorKind::Unsupported => {
            event!(Level::WARN, hostcall, "{}", err)
        }
        ErrorKind::ResourceNotFound => event!(Level::DEBUG, hostcall, "{}", err),
        _ => event!(Level::INFO, hostcall, "{}", err),
    }
}

/// Unwrap a handle, or log the failure and return the reserved handle `0`.
fn handle_or_zero<H, E>(hostcall: &'static str, res: Result<H, E>) -> u32
where
    H: Into<u32>,
    E: Into<Error>,
{
    match res {
        Ok(handle) => handle.into(),
        Err(err) => {
            log_failure(hostcall, &err.into());
            0
        }
    }
}

/// Write a `result<handle, error>` to the result area: `(0, handle)` or `(1, 0)`.
fn write_handle_result<T, H, E>(
    caller: &mut Caller<'_, T>,
    hostcall: &'static str,
    out: u32,
    res: Result<H, E>,
) where
    H: Into<u32>,
    E: Into<Error>,
{
    let words = match res {
        Ok(handle) => [0, handle.into()],
        Err(err) => {
            log_failure(hostcall, &err.into());
            [1, 0]
        }
    };
    if let Err(err) = write_out(caller, out, &words) {
        log_failure(hostcall, &err);
    }
}

/// Log a drop of a handle that was not live. Drops are otherwise silent.
fn log_stale_drop(hostcall: &'static str, handle: u32, dropped: bool) {
    if !dropped {
        event!(Level::DEBUG, hostcall, handle, "dropped an unknown handle");
    }
}
