//! Linking and name resolution.

use {
    crate::{abi, execute::ExecuteCtx, session::Session, Error},
    wasmtime::{Linker, Store},
    wasmtime_wasi::{preview1::WasiP1Ctx, WasiCtxBuilder},
};

/// The data stored in each guest's [`Store`].
pub struct WasmCtx {
    wasi: WasiP1Ctx,
    session: Session,
}

impl WasmCtx {
    pub fn wasi(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Initialize a new [`Store`][store], given an [`ExecuteCtx`][ctx].
///
/// `extra_init` may add arguments or environment variables to the guest's WASI context before it
/// is built.
///
/// [ctx]: ../execute/struct.ExecuteCtx.html
/// [store]: https://docs.rs/wasmtime/latest/wasmtime/struct.Store.html
pub(crate) fn create_store(
    ctx: &ExecuteCtx,
    session: Session,
    extra_init: impl FnOnce(&mut WasiCtxBuilder),
) -> Store<WasmCtx> {
    let mut builder = WasiCtxBuilder::new();
    builder.inherit_stdio();
    extra_init(&mut builder);
    let wasm_ctx = WasmCtx {
        wasi: builder.build_p1(),
        session,
    };
    Store::new(ctx.engine(), wasm_ctx)
}

/// Link the WASI preview1 imports and every bridge hostcall.
pub fn link_host_functions(linker: &mut Linker<WasmCtx>) -> Result<(), Error> {
    wasmtime_wasi::preview1::add_to_linker_async(linker, WasmCtx::wasi)?;
    abi::add_to_linker(linker, WasmCtx::session)?;
    Ok(())
}
