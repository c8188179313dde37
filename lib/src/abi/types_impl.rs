//! `wasi:http/types` hostcall implementations.

use {
    super::{
        copy_to_guest, guest_alloc, guest_memory, handle_or_zero, log_failure, log_stale_drop,
        memory_and_session, write_handle_result, write_out, TYPES_MODULE,
    },
    crate::{
        error::Error,
        handles::{BodyHandle, FieldsHandle, OutparamHandle, RequestHandle, ResponseHandle},
        logging::LogEndpoint,
        memory::{self, FieldListLayout, FIELD_LIST_ALIGN},
        session::Session,
    },
    wasmtime::{Caller, Linker},
};

/// Methods with a dedicated tag, in tag order.
const METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

/// The tag of a method spelled out as a string.
const METHOD_OTHER: u32 = 9;

/// Written in place of a tag when the request handle does not resolve. No method decodes from it.
const METHOD_UNKNOWN: u32 = u32::MAX;

const SCHEME_HTTP: u32 = 0;
const SCHEME_HTTPS: u32 = 1;
const SCHEME_OTHER: u32 = 2;

fn decode_method(mem: &[u8], tag: u32, ptr: u32, len: u32) -> Result<String, Error> {
    match METHODS.get(tag as usize) {
        Some(method) => Ok((*method).to_owned()),
        None if tag == METHOD_OTHER => Ok(memory::read_string(mem, ptr, len)?),
        None => Err(Error::InvalidArgument),
    }
}

fn method_tag(method: &str) -> Option<u32> {
    METHODS
        .iter()
        .position(|m| *m == method)
        .map(|tag| tag as u32)
}

fn decode_scheme(mem: &[u8], tag: u32, ptr: u32, len: u32) -> Result<String, Error> {
    match tag {
        SCHEME_HTTP => Ok("http".to_owned()),
        SCHEME_HTTPS => Ok("https".to_owned()),
        SCHEME_OTHER => Ok(memory::read_string(mem, ptr, len)?),
        _ => Err(Error::InvalidArgument),
    }
}

fn decode_option_string(
    mem: &[u8],
    is_some: u32,
    ptr: u32,
    len: u32,
) -> Result<Option<String>, Error> {
    match is_some {
        0 => Ok(None),
        _ => Ok(Some(memory::read_string(mem, ptr, len)?)),
    }
}

/// The flattened arguments of `new-outgoing-request`.
#[derive(Clone, Copy, Debug, Default)]
struct NewOutgoingRequest {
    method_tag: u32,
    method_ptr: u32,
    method_len: u32,
    path_is_some: u32,
    path_ptr: u32,
    path_len: u32,
    scheme_is_some: u32,
    scheme_tag: u32,
    scheme_ptr: u32,
    scheme_len: u32,
    authority_is_some: u32,
    authority_ptr: u32,
    authority_len: u32,
    headers: u32,
}

impl NewOutgoingRequest {
    fn call(&self, mem: &[u8], session: &Session) -> Result<RequestHandle, Error> {
        let method = decode_method(mem, self.method_tag, self.method_ptr, self.method_len)?;
        let path = decode_option_string(mem, self.path_is_some, self.path_ptr, self.path_len)?;
        let scheme = match self.scheme_is_some {
            0 => None,
            _ => Some(decode_scheme(
                mem,
                self.scheme_tag,
                self.scheme_ptr,
                self.scheme_len,
            )?),
        };
        let authority = decode_option_string(
            mem,
            self.authority_is_some,
            self.authority_ptr,
            self.authority_len,
        )?;
        session.new_outgoing_request(
            method,
            scheme,
            authority,
            path,
            FieldsHandle::from(self.headers),
        )
    }
}

/// Encode a header collection into a fresh guest allocation, returning `(list_ptr, list_len)`.
async fn fields_entries<T: Send>(
    caller: &mut Caller<'_, T>,
    session: &Session,
    fields: FieldsHandle,
) -> Result<[u32; 2], Error> {
    let entries = session.fields_entries(fields)?;
    let layout = FieldListLayout::new(&entries).ok_or(Error::InvalidArgument)?;
    let base = guest_alloc(caller, layout.size, FIELD_LIST_ALIGN).await?;
    let mem = guest_memory(caller)?;
    memory::write_field_list(mem.data_mut(&mut *caller), base, &entries)?;
    Ok([base, layout.count])
}

/// Encode a request's method as `(tag, ptr, len)`. Only the string form uses `ptr` and `len`.
async fn incoming_request_method<T: Send>(
    caller: &mut Caller<'_, T>,
    session: &Session,
    request: RequestHandle,
) -> Result<[u32; 3], Error> {
    let method = session.incoming_request_method(request)?;
    match method_tag(&method) {
        Some(tag) => Ok([tag, 0, 0]),
        None => {
            let ptr = copy_to_guest(caller, method.as_bytes()).await?;
            Ok([METHOD_OTHER, ptr, method.len() as u32])
        }
    }
}

/// Encode an `option<string>` as `(1, ptr, len)` or `(0, 0, 0)`.
async fn option_string<T: Send>(
    caller: &mut Caller<'_, T>,
    value: Option<String>,
) -> Result<[u32; 3], Error> {
    match value {
        Some(s) => {
            let ptr = copy_to_guest(caller, s.as_bytes()).await?;
            Ok([1, ptr, s.len() as u32])
        }
        None => Ok([0, 0, 0]),
    }
}

/// Complete a response outparam. Returns `1` if the value was accepted.
fn set_response_outparam(
    mem: &[u8],
    session: &Session,
    outparam: u32,
    is_err: u32,
    response: u32,
    msg_ptr: u32,
    msg_len: u32,
) -> Result<(), Error> {
    let value = match is_err {
        0 => Ok(ResponseHandle::from(response)),
        _ => Err(memory::read_string(mem, msg_ptr, msg_len)?),
    };
    session.set_response_outparam(OutparamHandle::from(outparam), value)
}

fn log_it(mem: &[u8], ptr: u32, len: u32) -> Result<(), Error> {
    let msg = memory::read_bytes(mem, ptr, len)?;
    LogEndpoint::guest().write_entry(msg)?;
    Ok(())
}

pub(super) fn add_to_linker<T, U>(linker: &mut Linker<T>, get_cx: U) -> Result<(), Error>
where
    T: Send + 'static,
    U: Fn(&mut T) -> &mut Session + Copy + Send + Sync + 'static,
{
    // ----- Fields -----

    linker.func_wrap(
        TYPES_MODULE,
        "[constructor]fields",
        move |mut caller: Caller<'_, T>, list_ptr: u32, list_len: u32| -> u32 {
            const NAME: &str = "[constructor]fields";
            let res = memory_and_session(&mut caller, get_cx)
                .map_err(Error::from)
                .and_then(|(mem, session)| {
                    let fields = memory::read_field_list(mem, list_ptr, list_len)?;
                    Ok(session.new_fields(fields))
                });
            handle_or_zero(NAME, res)
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "drop-fields",
        move |mut caller: Caller<'_, T>, fields: u32| {
            let dropped = get_cx(caller.data_mut()).drop_fields(FieldsHandle::from(fields));
            log_stale_drop("drop-fields", fields, dropped);
        },
    )?;

    linker.func_wrap_async(
        TYPES_MODULE,
        "fields-entries",
        move |mut caller: Caller<'_, T>, (fields, out): (u32, u32)| {
            Box::new(async move {
                const NAME: &str = "fields-entries";
                let session = get_cx(caller.data_mut()).clone();
                let words =
                    match fields_entries(&mut caller, &session, FieldsHandle::from(fields)).await {
                        Ok(words) => words,
                        Err(err) => {
                            log_failure(NAME, &err);
                            [0, 0]
                        }
                    };
                if let Err(err) = write_out(&mut caller, out, &words) {
                    log_failure(NAME, &err);
                }
            })
        },
    )?;

    // ----- Outgoing requests -----

    linker.func_wrap(
        TYPES_MODULE,
        "new-outgoing-request",
        move |mut caller: Caller<'_, T>,
              method_tag: u32,
              method_ptr: u32,
              method_len: u32,
              path_is_some: u32,
              path_ptr: u32,
              path_len: u32,
              scheme_is_some: u32,
              scheme_tag: u32,
              scheme_ptr: u32,
              scheme_len: u32,
              authority_is_some: u32,
              authority_ptr: u32,
              authority_len: u32,
              headers: u32|
              -> u32 {
            let args = NewOutgoingRequest {
                method_tag,
                method_ptr,
                method_len,
                path_is_some,
                path_ptr,
                path_len,
                scheme_is_some,
                scheme_tag,
                scheme_ptr,
                scheme_len,
                authority_is_some,
                authority_ptr,
                authority_len,
                headers,
            };
            let res = memory_and_session(&mut caller, get_cx)
                .map_err(Error::from)
                .and_then(|(mem, session)| args.call(mem, session));
            handle_or_zero("new-outgoing-request", res)
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "outgoing-request-write",
        move |mut caller: Caller<'_, T>, request: u32, out: u32| {
            let res = get_cx(caller.data_mut()).outgoing_request_write(RequestHandle::from(request));
            write_handle_result(&mut caller, "outgoing-request-write", out, res);
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "drop-outgoing-request",
        move |mut caller: Caller<'_, T>, request: u32| {
            let dropped =
                get_cx(caller.data_mut()).drop_outgoing_request(RequestHandle::from(request));
            log_stale_drop("drop-outgoing-request", request, dropped);
        },
    )?;

    // ----- Incoming responses -----

    linker.func_wrap(
        TYPES_MODULE,
        "incoming-response-status",
        move |mut caller: Caller<'_, T>, response: u32| -> u32 {
            match get_cx(caller.data_mut()).incoming_response_status(ResponseHandle::from(response))
            {
                Ok(status) => status.into(),
                Err(err) => {
                    log_failure("incoming-response-status", &err.into());
                    0
                }
            }
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "incoming-response-headers",
        move |mut caller: Caller<'_, T>, response: u32| -> u32 {
            let res =
                get_cx(caller.data_mut()).incoming_response_headers(ResponseHandle::from(response));
            handle_or_zero("incoming-response-headers", res)
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "incoming-response-consume",
        move |mut caller: Caller<'_, T>, response: u32, out: u32| {
            let res =
                get_cx(caller.data_mut()).incoming_response_consume(ResponseHandle::from(response));
            write_handle_result(&mut caller, "incoming-response-consume", out, res);
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "future-incoming-response-get",
        move |mut caller: Caller<'_, T>, future: u32, out: u32| {
            const NAME: &str = "future-incoming-response-get";
            // option<result<result<incoming-response, error>>>: the future is always ready, and
            // an unknown handle is reported through the outer error arm.
            let words = match get_cx(caller.data_mut())
                .future_incoming_response_get(ResponseHandle::from(future))
            {
                Ok(response) => [1, 0, 0, response.into()],
                Err(err) => {
                    log_failure(NAME, &err.into());
                    [1, 1, 0, 0]
                }
            };
            if let Err(err) = write_out(&mut caller, out, &words) {
                log_failure(NAME, &err);
            }
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "drop-incoming-response",
        move |mut caller: Caller<'_, T>, response: u32| {
            let dropped =
                get_cx(caller.data_mut()).drop_incoming_response(ResponseHandle::from(response));
            log_stale_drop("drop-incoming-response", response, dropped);
        },
    )?;

    // ----- Incoming requests -----

    linker.func_wrap_async(
        TYPES_MODULE,
        "[method]incoming-request.method",
        move |mut caller: Caller<'_, T>, (request, out): (u32, u32)| {
            Box::new(async move {
                const NAME: &str = "[method]incoming-request.method";
                let session = get_cx(caller.data_mut()).clone();
                let words = match incoming_request_method(
                    &mut caller,
                    &session,
                    RequestHandle::from(request),
                )
                .await
                {
                    Ok(words) => words,
                    Err(err) => {
                        log_failure(NAME, &err);
                        [METHOD_UNKNOWN, 0, 0]
                    }
                };
                if let Err(err) = write_out(&mut caller, out, &words) {
                    log_failure(NAME, &err);
                }
            })
        },
    )?;

    linker.func_wrap_async(
        TYPES_MODULE,
        "[method]incoming-request.path-with-query",
        move |mut caller: Caller<'_, T>, (request, out): (u32, u32)| {
            Box::new(async move {
                const NAME: &str = "[method]incoming-request.path-with-query";
                let session = get_cx(caller.data_mut()).clone();
                let res = match session.incoming_request_path_with_query(RequestHandle::from(request))
                {
                    Ok(path) => option_string(&mut caller, path).await,
                    Err(err) => Err(err.into()),
                };
                let words = res.unwrap_or_else(|err| {
                    log_failure(NAME, &err);
                    [0, 0, 0]
                });
                if let Err(err) = write_out(&mut caller, out, &words) {
                    log_failure(NAME, &err);
                }
            })
        },
    )?;

    linker.func_wrap_async(
        TYPES_MODULE,
        "[method]incoming-request.authority",
        move |mut caller: Caller<'_, T>, (request, out): (u32, u32)| {
            Box::new(async move {
                const NAME: &str = "[method]incoming-request.authority";
                let session = get_cx(caller.data_mut()).clone();
                let res = match session.incoming_request_authority(RequestHandle::from(request)) {
                    Ok(authority) => option_string(&mut caller, authority).await,
                    Err(err) => Err(err.into()),
                };
                let words = res.unwrap_or_else(|err| {
                    log_failure(NAME, &err);
                    [0, 0, 0]
                });
                if let Err(err) = write_out(&mut caller, out, &words) {
                    log_failure(NAME, &err);
                }
            })
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "[method]incoming-request.headers",
        move |mut caller: Caller<'_, T>, request: u32| -> u32 {
            let res =
                get_cx(caller.data_mut()).incoming_request_headers(RequestHandle::from(request));
            handle_or_zero("[method]incoming-request.headers", res)
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "[method]incoming-request.consume",
        move |mut caller: Caller<'_, T>, request: u32, out: u32| {
            let res =
                get_cx(caller.data_mut()).incoming_request_consume(RequestHandle::from(request));
            write_handle_result(&mut caller, "[method]incoming-request.consume", out, res);
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "drop-incoming-request",
        move |mut caller: Caller<'_, T>, request: u32| {
            let dropped =
                get_cx(caller.data_mut()).drop_incoming_request(RequestHandle::from(request));
            log_stale_drop("drop-incoming-request", request, dropped);
        },
    )?;

    // ----- Outgoing responses -----

    linker.func_wrap(
        TYPES_MODULE,
        "[static]response-outparam.set",
        move |mut caller: Caller<'_, T>,
              outparam: u32,
              is_err: u32,
              response: u32,
              msg_ptr: u32,
              msg_len: u32|
              -> u32 {
            let res = memory_and_session(&mut caller, get_cx)
                .map_err(Error::from)
                .and_then(|(mem, session)| {
                    set_response_outparam(mem, session, outparam, is_err, response, msg_ptr, msg_len)
                });
            match res {
                Ok(()) => 1,
                Err(err) => {
                    log_failure("[static]response-outparam.set", &err);
                    0
                }
            }
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "[constructor]outgoing-response",
        move |mut caller: Caller<'_, T>, status: u32, headers: u32| -> u32 {
            let res = u16::try_from(status)
                .map_err(|_| Error::InvalidArgument)
                .and_then(|status| {
                    get_cx(caller.data_mut())
                        .new_outgoing_response(status, FieldsHandle::from(headers))
                });
            handle_or_zero("[constructor]outgoing-response", res)
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "[method]outgoing-response.write",
        move |mut caller: Caller<'_, T>, response: u32, out: u32| {
            let res =
                get_cx(caller.data_mut()).outgoing_response_write(ResponseHandle::from(response));
            write_handle_result(&mut caller, "[method]outgoing-response.write", out, res);
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "drop-outgoing-response",
        move |mut caller: Caller<'_, T>, response: u32| {
            let dropped =
                get_cx(caller.data_mut()).drop_outgoing_response(ResponseHandle::from(response));
            log_stale_drop("drop-outgoing-response", response, dropped);
        },
    )?;

    // ----- Outgoing bodies -----

    linker.func_wrap(
        TYPES_MODULE,
        "[method]outgoing-body.write",
        move |mut caller: Caller<'_, T>, body: u32, out: u32| {
            let res = get_cx(caller.data_mut()).outgoing_body_write(BodyHandle::from(body));
            write_handle_result(&mut caller, "[method]outgoing-body.write", out, res);
        },
    )?;

    linker.func_wrap(
        TYPES_MODULE,
        "[static]outgoing-body.finish",
        move |mut caller: Caller<'_, T>, body: u32| -> u32 {
            match get_cx(caller.data_mut()).outgoing_body_finish(BodyHandle::from(body)) {
                Ok(()) => 1,
                Err(err) => {
                    log_failure("[static]outgoing-body.finish", &err);
                    0
                }
            }
        },
    )?;

    // ----- Debug output -----

    linker.func_wrap(
        TYPES_MODULE,
        "log-it",
        move |mut caller: Caller<'_, T>, ptr: u32, len: u32| {
            let res = guest_memory(&mut caller)
                .map_err(Error::from)
                .and_then(|mem| log_it(mem.data(&caller), ptr, len));
            if let Err(err) = res {
                log_failure("log-it", &err);
            }
        },
    )?;

    Ok(())
}
