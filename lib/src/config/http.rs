use std::time::Duration;

/// The `[http]` section: outbound allow-lists and transport settings.
#[derive(Clone, Debug, Default)]
pub struct HttpConfig {
    pub allowed_hosts: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub timeout: Option<Duration>,
}

/// This module contains [`TryFrom`] implementations used when deserializing a bridge TOML file.
///
/// These implementations are called indirectly by [`BridgeConfig::from_file`][super::BridgeConfig],
/// and help validate that we have been given an appropriate TOML schema. If the configuration is
/// not valid, a [`BridgeConfigError`][crate::error::BridgeConfigError] will be returned.
mod deserialization {
    use {
        super::HttpConfig,
        crate::error::{BridgeConfigError, HttpConfigError},
        std::time::Duration,
        toml::value::{Table, Value},
    };

    /// Return an [`HttpConfigError::UnrecognizedKey`] error if any unrecognized keys are found.
    ///
    /// This should be called after we have removed and validated the keys we expect in a [`Table`].
    fn check_for_unrecognized_keys(table: &Table) -> Result<(), HttpConfigError> {
        if let Some(key) = table.keys().next() {
            // While other keys might still exist, we can at least return a helpful error including
            // the name of *one* unrecognized keys we found.
            Err(HttpConfigError::UnrecognizedKey(key.to_owned()))
        } else {
            Ok(())
        }
    }

    /// Read an optional array of non-empty strings.
    fn string_list(
        value: Option<Value>,
        invalid: HttpConfigError,
        empty: HttpConfigError,
    ) -> Result<Vec<String>, HttpConfigError> {
        let items = match value {
            None => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(invalid),
        };
        let mut list = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) if s.trim().is_empty() => return Err(empty),
                Value::String(s) => list.push(s),
                _ => return Err(invalid),
            }
        }
        Ok(list)
    }

    impl TryFrom<Table> for HttpConfig {
        type Error = BridgeConfigError;
        fn try_from(mut toml: Table) -> Result<Self, Self::Error> {
            let allowed_hosts = string_list(
                toml.remove("allowed_hosts"),
                HttpConfigError::InvalidHostsEntry,
                HttpConfigError::EmptyHost,
            )?;

            let allowed_methods = string_list(
                toml.remove("allowed_methods"),
                HttpConfigError::InvalidMethodsEntry,
                HttpConfigError::EmptyMethod,
            )?;

            let timeout = toml
                .remove("timeout_ms")
                .map(|timeout| match timeout {
                    Value::Integer(ms) if ms > 0 => Ok(Duration::from_millis(ms as u64)),
                    _ => Err(HttpConfigError::InvalidTimeoutEntry),
                })
                .transpose()?;

            check_for_unrecognized_keys(&toml)?;

            Ok(Self {
                allowed_hosts,
                allowed_methods,
                timeout,
            })
        }
    }
}
