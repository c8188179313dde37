//! Command line arguments.

use {
    clap::{ArgAction, Parser},
    std::path::{Path, PathBuf},
    wasi_http_bridge_lib::Error,
};

// Command-line arguments for the bridge CLI.
//
// This struct is used to derive a command-line argument parser. See the
// [clap](https://docs.rs/clap/latest/clap) documentation for more information.
//
// Note that the doc comment below is used as descriptive text in the `--help` output.
/// Run a WebAssembly guest whose outbound HTTP goes through host and method allow-lists.
#[derive(Debug, Parser)]
#[command(name = "wasi-http-bridge", author, version)]
pub struct Opts {
    /// The path to the guest's Wasm module.
    #[arg(value_parser = check_module)]
    input: PathBuf,
    /// The path to a TOML file containing an `[http]` section.
    #[arg(short = 'C', long = "config")]
    config_path: Option<PathBuf>,
    /// Allow requests to this `host:port`, in addition to any in the configuration file.
    #[arg(long = "allow-host", value_name = "HOST:PORT")]
    allowed_hosts: Vec<String>,
    /// Allow requests with this method, in addition to any in the configuration file.
    #[arg(long = "allow-method", value_name = "METHOD")]
    allowed_methods: Vec<String>,
    /// Verbosity of logs. `-v` sets the log level to DEBUG and `-vv` to TRACE. This option will
    /// not take effect if you set RUST_LOG to a value before starting.
    #[arg(short = 'v', action = ArgAction::Count)]
    verbosity: u8,
    /// Arguments to pass to the guest, after `--`.
    #[arg(last = true)]
    wasm_args: Vec<String>,
}

impl Opts {
    /// The path to the guest's Wasm binary.
    pub fn input(&self) -> &Path {
        self.input.as_ref()
    }

    /// The path to a bridge configuration file.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Hosts allowed on the command line.
    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    /// Methods allowed on the command line.
    pub fn allowed_methods(&self) -> &[String] {
        &self.allowed_methods
    }

    /// Verbosity of logs. `-v` sets the log level to DEBUG and `-vv` to TRACE.
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Arguments to pass to the guest.
    pub fn wasm_args(&self) -> &[String] {
        &self.wasm_args
    }
}

/// A parsing function used by [`Opts`][opts] to check that the input is a valid Wasm module in
/// binary or text format.
///
/// [opts]: struct.Opts.html
fn check_module(s: &str) -> Result<PathBuf, Error> {
    let path = PathBuf::from(s);
    let contents = std::fs::read(&path)?;
    match wat::parse_bytes(&contents) {
        Ok(_) => Ok(path),
        _ => Err(Error::FileFormat),
    }
}
