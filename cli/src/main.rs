//! Run a WebAssembly guest with the WASI HTTP bridge linked.

// When building the project in release mode:
//   (1): Promote warnings into errors.
//   (2): Deny broken documentation links.
//   (3): Deny invalid codeblock attributes in documentation.
//   (4): Promote warnings in examples into errors, except for unused variables.
#![cfg_attr(not(debug_assertions), deny(warnings))]
#![cfg_attr(not(debug_assertions), deny(clippy::all))]
#![cfg_attr(not(debug_assertions), deny(rustdoc::broken_intra_doc_links))]
#![cfg_attr(not(debug_assertions), deny(rustdoc::invalid_codeblock_attributes))]
#![cfg_attr(not(debug_assertions), doc(test(attr(deny(warnings)))))]
#![cfg_attr(not(debug_assertions), doc(test(attr(allow(dead_code)))))]
#![cfg_attr(not(debug_assertions), doc(test(attr(allow(unused_variables)))))]

mod execute_ctx;
mod opts;

use {
    crate::{
        execute_ctx::{create_execution_context, StdWriter},
        opts::Opts,
    },
    clap::Parser,
    std::{env, process::ExitCode},
    tracing::{event, Level},
    tracing_subscriber::{filter::EnvFilter, FmtSubscriber},
    wasmtime_wasi::I32Exit,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    // Parse the command-line options, exiting if there are any errors
    let opts = Opts::parse();

    install_tracing_subscriber(opts.verbosity());
    match run_wasm_main(opts).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            // Suppress stack trace if the error is due to a
            // normal call to proc_exit, leading to a process
            // exit.
            if !e.is::<I32Exit>() {
                event!(Level::ERROR, "{}", e);
            }
            get_exit_code(e)
        }
    }
}

/// Execute a Wasm program with the bridge linked.
async fn run_wasm_main(opts: Opts) -> Result<(), anyhow::Error> {
    // Load the wasm module into an execution context
    let ctx = create_execution_context(&opts)?;
    let program_name = opts
        .input()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("guest"));
    ctx.run_main(&program_name, opts.wasm_args()).await
}

// This function is based on similar exit code logic in the wasmtime cli:
// https://github.com/bytecodealliance/wasmtime/blob/cc768f/src/commands/run.rs#L214-L246
fn get_exit_code(e: anyhow::Error) -> ExitCode {
    // If we exited with a specific WASI exit code, forward that to
    // the process
    if let Some(exit) = e.downcast_ref::<I32Exit>() {
        // On Windows, exit status 3 indicates an abort (see below),
        // so return 1 indicating a non-zero status to avoid ambiguity.
        if cfg!(windows) && exit.0 >= 3 {
            return ExitCode::FAILURE;
        }
        return ExitCode::from(exit.0 as u8);
    }

    // If the program exited because of a trap, return an error code
    // to the outside environment indicating a more severe problem
    // than a simple failure.
    if e.is::<wasmtime::Trap>() {
        if cfg!(unix) {
            // On Unix, return the error code of an abort.
            return ExitCode::from(128u8 + libc::SIGABRT as u8);
        } else if cfg!(windows) {
            // On Windows, return 3.
            // https://docs.microsoft.com/en-us/cpp/c-runtime-library/reference/abort?view=vs-2019
            return ExitCode::from(3u8);
        }
    }
    // Otherwise just return 1
    ExitCode::FAILURE
}

fn install_tracing_subscriber(verbosity: u8) {
    // Default to whatever a user provides, but if not set logging to work for
    // the bridge and its library so that they can have output in the terminal
    if env::var("RUST_LOG").ok().is_none() {
        match verbosity {
            0 => env::set_var("RUST_LOG", "wasi_http_bridge=info,wasi_http_bridge_lib=info"),
            1 => env::set_var("RUST_LOG", "wasi_http_bridge=debug,wasi_http_bridge_lib=debug"),
            _ => env::set_var("RUST_LOG", "wasi_http_bridge=trace,wasi_http_bridge_lib=trace"),
        }
    }
    // Build a subscriber, using the default `RUST_LOG` environment variable for our filter.
    let builder = FmtSubscriber::builder()
        .with_writer(StdWriter::new())
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false);

    match env::var("RUST_LOG_PRETTY") {
        // If the `RUST_LOG_PRETTY` environment variable is set to "true", we should emit logs in a
        // pretty, human-readable output format.
        Ok(s) if s == "true" => builder
            .pretty()
            // Show levels, because ANSI escape sequences are normally used to indicate this.
            .with_level(true)
            .init(),
        // Otherwise, we should install the subscriber without any further additions.
        _ => builder.with_ansi(false).init(),
    }
    event!(
        Level::DEBUG,
        "RUST_LOG set to '{}'",
        env::var("RUST_LOG").unwrap_or_else(|_| String::from("<Could not get env>"))
    );
}
