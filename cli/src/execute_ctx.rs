//! Building an execution context from the command line, and where logs are written.

use {
    crate::opts::Opts,
    std::io::{self, Stderr, Stdout},
    tracing::{event, Level, Metadata},
    tracing_subscriber::fmt::writer::MakeWriter,
    wasi_http_bridge_lib::{BridgeConfig, ExecuteCtx, Policy},
};

pub(crate) enum Stdio {
    Stdout(Stdout),
    Stderr(Stderr),
}

impl io::Write for Stdio {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::Stderr(err) => err.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.write_all(buf),
            Self::Stderr(err) => err.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::Stderr(err) => err.flush(),
        }
    }
}

pub(crate) struct StdWriter;

impl StdWriter {
    pub(crate) fn new() -> Self {
        Self {}
    }
}

impl<'a> MakeWriter<'a> for StdWriter {
    type Writer = Stdio;

    // Guest output goes to stdout, so logs default there too.
    fn make_writer(&self) -> Self::Writer {
        Stdio::Stdout(io::stdout())
    }

    // Errors go to stderr as if we used eprintln, and everything else to stdout.
    fn make_writer_for(&self, meta: &Metadata<'_>) -> Self::Writer {
        if meta.level() == &Level::ERROR {
            Stdio::Stderr(io::stderr())
        } else {
            Stdio::Stdout(io::stdout())
        }
    }
}

/// Extend a policy's allow-lists with the ones given on the command line.
pub(crate) fn extend_policy(policy: Policy, hosts: &[String], methods: &[String]) -> Policy {
    let allowed_hosts = [policy.allowed_hosts(), hosts].concat();
    let allowed_methods = [policy.allowed_methods(), methods].concat();
    Policy::new(allowed_hosts, allowed_methods)
}

pub(crate) fn create_execution_context(opts: &Opts) -> Result<ExecuteCtx, anyhow::Error> {
    let ctx = ExecuteCtx::new(opts.input())?;

    let config = match opts.config_path() {
        Some(config_path) => BridgeConfig::from_file(config_path)?,
        None => {
            event!(
                Level::DEBUG,
                "no configuration provided, invoke with `-C <TOML_FILE>` to provide a configuration"
            );
            BridgeConfig::default()
        }
    };

    let policy = extend_policy(
        config.policy(),
        opts.allowed_hosts(),
        opts.allowed_methods(),
    );
    if policy.allowed_hosts().is_empty() {
        event!(
            Level::WARN,
            "no allowed hosts configured; the guest may send requests to any host"
        );
    } else {
        event!(
            Level::INFO,
            "allowing requests to {}",
            itertools::join(policy.allowed_hosts(), ", ")
        );
    }
    if !policy.allowed_methods().is_empty() {
        event!(
            Level::INFO,
            "allowing methods {}",
            itertools::join(policy.allowed_methods(), ", ")
        );
    }

    Ok(ctx.with_config(&config).with_policy(policy))
}
