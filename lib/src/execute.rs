//! Guest code execution.

use {
    crate::{
        config::BridgeConfig,
        error::ExecutionError,
        linking::{create_store, link_host_functions, WasmCtx},
        policy::Policy,
        session::{IncomingRequest, Session},
        upstream::{HyperTransport, TlsConfig, Transport},
        Error,
    },
    bytes::Bytes,
    http::{Request, Response},
    std::{path::Path, sync::Arc, time::Instant},
    tokio::sync::oneshot::error::TryRecvError,
    tracing::{event, info, Level},
    wasmtime::{Engine, InstancePre, Linker, Module, Store},
    wasmtime_wasi::I32Exit,
};

/// The export a guest provides to handle an incoming request.
///
/// It takes an incoming-request handle and a response-outparam handle, and returns nothing.
pub const INCOMING_HANDLER_EXPORT: &str = "wasi:http/incoming-handler@0.2.0-rc-2023-10-18#handle";

/// Execution context: everything needed to instantiate a guest with the bridge linked.
///
/// An `ExecuteCtx` is cheap to clone. Each run gets a fresh [`Session`], so handles never leak
/// from one run into the next.
#[derive(Clone)]
pub struct ExecuteCtx {
    /// A reference to the global context for Wasm compilation.
    engine: Engine,
    /// An almost-linked Instance: each import function is linked, just needs a Store
    instance_pre: Arc<InstancePre<WasmCtx>>,
    /// Preloaded TLS certificates and configuration
    tls_config: TlsConfig,
    /// The allow-lists consulted before each outgoing request.
    policy: Policy,
    /// Performs the outgoing requests that pass the policy.
    transport: Arc<dyn Transport>,
}

impl ExecuteCtx {
    /// Create a new execution context, given the path to a module in binary or text format.
    pub fn new(module_path: impl AsRef<Path>) -> Result<Self, Error> {
        let engine = Engine::new(&configure_wasmtime())?;
        let module = Module::from_file(&engine, module_path)?;
        Self::with_module(engine, module)
    }

    /// Create a new execution context from a module's bytes, in binary or text format.
    pub fn from_module_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, Error> {
        let engine = Engine::new(&configure_wasmtime())?;
        let module = Module::new(&engine, bytes)?;
        Self::with_module(engine, module)
    }

    fn with_module(engine: Engine, module: Module) -> Result<Self, Error> {
        let mut linker = Linker::new(&engine);
        link_host_functions(&mut linker)?;
        let instance_pre = linker.instantiate_pre(&module)?;
        let tls_config = TlsConfig::new()?;
        let transport = Arc::new(HyperTransport::new(&tls_config, None));

        Ok(Self {
            engine,
            instance_pre: Arc::new(instance_pre),
            tls_config,
            policy: Policy::permit_all(),
            transport,
        })
    }

    /// Get the engine for this execution context.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get the TLS configuration for this execution context.
    pub fn tls_config(&self) -> &TlsConfig {
        &self.tls_config
    }

    /// Get the policy for this execution context.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Set the policy for this execution context.
    pub fn with_policy(self, policy: Policy) -> Self {
        Self { policy, ..self }
    }

    /// Set the transport for this execution context.
    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        Self { transport, ..self }
    }

    /// Apply a bridge configuration: its policy, and a transport using its timeout.
    pub fn with_config(self, config: &BridgeConfig) -> Self {
        let transport = Arc::new(HyperTransport::new(&self.tls_config, config.timeout()));
        Self {
            policy: config.policy(),
            transport,
            ..self
        }
    }

    /// Create a session with this context's policy and transport.
    pub fn new_session(&self) -> Session {
        Session::new(self.policy.clone(), self.transport.clone())
    }

    fn new_store(&self, session: Session, program_name: &str, args: &[String]) -> Store<WasmCtx> {
        create_store(self, session, |builder| {
            builder.arg(program_name);
            for arg in args {
                builder.arg(arg);
            }
        })
    }

    /// Run the guest's `_start` export to completion.
    ///
    /// A WASI exit with status `0` is a success. Any other exit is returned as an error that can
    /// be downcast to [`I32Exit`].
    pub async fn run_main(&self, program_name: &str, args: &[String]) -> Result<(), anyhow::Error> {
        let start_timestamp = Instant::now();
        let mut store = self.new_store(self.new_session(), program_name, args);

        let instance = self
            .instance_pre
            .instantiate_async(&mut store)
            .await
            .map_err(ExecutionError::Instantiation)?;

        // Pull out the `_start` function, which by convention with WASI is the main entry point for
        // an application.
        let main_func = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(ExecutionError::Typechecking)?;

        let result = main_func.call_async(&mut store, ()).await;
        info!(
            "{} completed in {:.0?}",
            program_name,
            start_timestamp.elapsed()
        );

        match result {
            Ok(()) => Ok(()),
            Err(e) => match e.downcast_ref::<I32Exit>() {
                Some(exit) if exit.0 == 0 => Ok(()),
                _ => Err(e),
            },
        }
    }

    /// Hand one request to the guest's [`INCOMING_HANDLER_EXPORT`], and return the response it
    /// sets on its outparam.
    pub async fn handle_request(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        info!("handling request {} {}", req.method(), req.uri());
        let session = self.new_session();
        let request = session.insert_incoming_request(IncomingRequest::from(req));
        let (outparam, mut receiver) = session.new_response_outparam();
        let mut store = self.new_store(session, "handler", &[]);

        let instance = self
            .instance_pre
            .instantiate_async(&mut store)
            .await
            .map_err(ExecutionError::Instantiation)?;
        let handler = instance
            .get_typed_func::<(u32, u32), ()>(&mut store, INCOMING_HANDLER_EXPORT)
            .map_err(ExecutionError::Typechecking)?;

        if let Err(e) = handler
            .call_async(&mut store, (request.into(), outparam.into()))
            .await
        {
            event!(Level::ERROR, "WebAssembly trapped: {:?}", e);
            return Err(ExecutionError::WasmTrap(e).into());
        }

        // The outparam is completed synchronously, so it is either set by now or never will be.
        match receiver.try_recv() {
            Ok(Ok(parts)) => parts.into_response(),
            Ok(Err(msg)) => Err(ExecutionError::GuestError(msg).into()),
            Err(TryRecvError::Empty | TryRecvError::Closed) => {
                Err(ExecutionError::MissingResponse.into())
            }
        }
    }
}

fn configure_wasmtime() -> wasmtime::Config {
    use wasmtime::{Config, WasmBacktraceDetails};

    let mut config = Config::new();
    config.debug_info(false);
    config.wasm_backtrace_details(WasmBacktraceDetails::Enable);
    // `handle` awaits the transport, so every hostcall runs on an async store.
    config.async_support(true);
    config
}
