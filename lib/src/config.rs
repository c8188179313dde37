//! Bridge configuration utilities.

use {
    self::http::HttpConfig,
    crate::{error::BridgeConfigError, policy::Policy},
    serde_derive::Deserialize,
    std::{convert::TryInto, fs, path::Path, str::FromStr, time::Duration},
    toml::value::Table,
};

/// Unit tests for the [`BridgeConfig`] type.
#[cfg(test)]
mod unit_tests;

/// Types and deserializers for the `[http]` section.
mod http;

/// Bridge configuration.
///
/// This `struct` represents the fields and values in a bridge TOML file. Every section is
/// optional, and a missing section leaves the corresponding settings at their permissive defaults.
#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
    http: HttpConfig,
}

impl BridgeConfig {
    /// The outbound access-control policy.
    pub fn policy(&self) -> Policy {
        Policy::new(
            self.http.allowed_hosts.clone(),
            self.http.allowed_methods.clone(),
        )
    }

    /// The per-request transport timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.http.timeout
    }

    /// Parse a TOML file into a `BridgeConfig`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BridgeConfigError> {
        fs::read_to_string(path.as_ref())
            .map_err(|err| BridgeConfigError::IoError {
                path: path.as_ref().display().to_string(),
                err,
            })
            .and_then(Self::from_str)
    }

    /// Parse a string containing TOML data into a `BridgeConfig`.
    fn from_str(toml: impl AsRef<str>) -> Result<Self, BridgeConfigError> {
        toml::from_str::<'_, TomlBridgeConfig>(toml.as_ref())
            .map_err(Into::into)
            .and_then(TryInto::try_into)
    }
}

impl FromStr for BridgeConfig {
    type Err = BridgeConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

/// Internal deserializer used to read data from a bridge TOML file.
///
/// Once a TOML file has been read using [`toml::from_str`], this can be converted into a
/// [`BridgeConfig`] with [`TryInto::try_into`].
#[derive(Deserialize)]
struct TomlBridgeConfig {
    http: Option<Table>,
}

impl TryInto<BridgeConfig> for TomlBridgeConfig {
    type Error = BridgeConfigError;
    fn try_into(self) -> Result<BridgeConfig, Self::Error> {
        let Self { http } = self;
        let http = if let Some(http) = http {
            http.try_into()?
        } else {
            HttpConfig::default()
        };
        Ok(BridgeConfig { http })
    }
}
