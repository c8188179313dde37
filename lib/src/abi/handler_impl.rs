//! `default-outgoing-HTTP` hostcall implementations.

use {
    super::{handle_or_zero, log_failure, OUTGOING_HANDLER_MODULE},
    crate::{error::Error, handles::RequestHandle, session::Session},
    wasmtime::{Caller, Linker},
};

pub(super) fn add_to_linker<T, U>(linker: &mut Linker<T>, get_cx: U) -> Result<(), Error>
where
    T: Send + 'static,
    U: Fn(&mut T) -> &mut Session + Copy + Send + Sync + 'static,
{
    // The flattened request record is accepted so guests link, but one-shot requests are not
    // served; guests build a request resource and call `handle` instead.
    linker.func_wrap(
        OUTGOING_HANDLER_MODULE,
        "request",
        |_: Caller<'_, T>,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32,
         _: u32|
         -> u32 {
            log_failure(
                "request",
                &Error::Unsupported {
                    msg: "one-shot requests are not supported; use `handle`",
                },
            );
            0
        },
    )?;

    // Request options are reserved and ignored; timeouts come from the bridge configuration.
    linker.func_wrap_async(
        OUTGOING_HANDLER_MODULE,
        "handle",
        move |mut caller: Caller<'_, T>,
              (request, _, _, _, _, _, _, _): (u32, u32, u32, u32, u32, u32, u32, u32)| {
            Box::new(async move {
                let session = get_cx(caller.data_mut()).clone();
                let res = session.handle(RequestHandle::from(request)).await;
                handle_or_zero("handle", res)
            })
        },
    )?;

    Ok(())
}
