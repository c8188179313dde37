//! `wasi:io/streams` hostcall implementations.

use {
    super::{
        copy_to_guest, guest_memory, log_failure, log_stale_drop, write_out, STREAMS_MODULE,
    },
    crate::{error::Error, handles::StreamHandle, memory, session::Session},
    wasmtime::{Caller, Linker},
};

/// Read from an input stream into a fresh guest allocation, returning `(ptr, len, status)`.
///
/// The stream only moves forward once the chunk is in guest memory; a failed copy leaves it for
/// the next read.
async fn read<T: Send>(
    caller: &mut Caller<'_, T>,
    session: &Session,
    stream: StreamHandle,
    len: u64,
) -> Result<[u32; 3], Error> {
    let (chunk, status) = session.stream_peek(stream, len)?;
    let ptr = copy_to_guest(caller, &chunk).await?;
    session.stream_advance(stream, chunk.len())?;
    Ok([ptr, chunk.len() as u32, status as u32])
}

/// Write a `result<u64, stream-error>` to the result area: `0` then the count at `out + 8`, or `1`.
fn write_count<T>(
    caller: &mut Caller<'_, T>,
    out: u32,
    res: Result<u64, Error>,
) -> Result<(), Error> {
    let mem = guest_memory(caller)?;
    let data = mem.data_mut(caller);
    match res {
        Ok(n) => {
            // Both words land or neither does.
            memory::read_bytes(data, out, 16)?;
            memory::write_u32(data, out, 0)?;
            memory::write_u64(data, out.saturating_add(8), n)?;
        }
        Err(_) => memory::write_u32(data, out, 1)?,
    }
    Ok(())
}

fn read_hostcall<T, U>(linker: &mut Linker<T>, name: &'static str, get_cx: U) -> Result<(), Error>
where
    T: Send + 'static,
    U: Fn(&mut T) -> &mut Session + Copy + Send + Sync + 'static,
{
    linker.func_wrap_async(
        STREAMS_MODULE,
        name,
        move |mut caller: Caller<'_, T>, (stream, len, out): (u32, u64, u32)| {
            Box::new(async move {
                let session = get_cx(caller.data_mut()).clone();
                let words = match read(&mut caller, &session, StreamHandle::from(stream), len).await
                {
                    Ok([ptr, len, status]) => [0, ptr, len, status],
                    Err(err) => {
                        log_failure(name, &err);
                        [1, 0, 0, 0]
                    }
                };
                if let Err(err) = write_out(&mut caller, out, &words) {
                    log_failure(name, &err);
                }
            })
        },
    )?;
    Ok(())
}

fn write_hostcall<T, U>(linker: &mut Linker<T>, name: &'static str, get_cx: U) -> Result<(), Error>
where
    T: Send + 'static,
    U: Fn(&mut T) -> &mut Session + Copy + Send + Sync + 'static,
{
    linker.func_wrap(
        STREAMS_MODULE,
        name,
        move |mut caller: Caller<'_, T>, stream: u32, ptr: u32, len: u32, out: u32| {
            let res = guest_memory(&mut caller)
                .map_err(Error::from)
                .and_then(|mem| {
                    let (data, store) = mem.data_and_store_mut(&mut caller);
                    let bytes = memory::read_bytes(data, ptr, len)?;
                    get_cx(store).stream_write(StreamHandle::from(stream), bytes)
                });
            if let Err(err) = &res {
                log_failure(name, err);
            }
            if let Err(err) = write_count(&mut caller, out, res) {
                log_failure(name, &err);
            }
        },
    )?;
    Ok(())
}

pub(super) fn add_to_linker<T, U>(linker: &mut Linker<T>, get_cx: U) -> Result<(), Error>
where
    T: Send + 'static,
    U: Fn(&mut T) -> &mut Session + Copy + Send + Sync + 'static,
{
    // Bodies are fully buffered, so the blocking variants never wait.
    read_hostcall(linker, "read", get_cx)?;
    read_hostcall(linker, "blocking-read", get_cx)?;
    write_hostcall(linker, "write", get_cx)?;
    write_hostcall(linker, "blocking-write-and-flush", get_cx)?;

    linker.func_wrap(
        STREAMS_MODULE,
        "check-write",
        move |mut caller: Caller<'_, T>, stream: u32, out: u32| {
            let res = get_cx(caller.data_mut()).stream_check_write(StreamHandle::from(stream));
            if let Err(err) = &res {
                log_failure("check-write", err);
            }
            if let Err(err) = write_count(&mut caller, out, res) {
                log_failure("check-write", &err);
            }
        },
    )?;

    linker.func_wrap(
        STREAMS_MODULE,
        "drop-input-stream",
        move |mut caller: Caller<'_, T>, stream: u32| {
            let dropped = get_cx(caller.data_mut()).drop_input_stream(StreamHandle::from(stream));
            log_stale_drop("drop-input-stream", stream, dropped);
        },
    )?;

    linker.func_wrap(
        STREAMS_MODULE,
        "drop-output-stream",
        move |mut caller: Caller<'_, T>, stream: u32| {
            let dropped = get_cx(caller.data_mut()).drop_output_stream(StreamHandle::from(stream));
            log_stale_drop("drop-output-stream", stream, dropped);
        },
    )?;

    Ok(())
}
