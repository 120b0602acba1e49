use std::env;

use serde::{Deserialize, Deserializer};

use crate::{NegotiateOptions, ProtocolName, Result};

pub const PROTOCOL_ENV: &str = "SPNEGO_PROTOCOL";
pub const OPTIONS_ENV: &str = "SPNEGO_OPTIONS";
pub const SERVICE_ENV: &str = "SPNEGO_SERVICE";
pub const HOSTNAME_ENV: &str = "SPNEGO_HOSTNAME";

pub const DEFAULT_HOSTNAME: &str = "unspecified";
pub const DEFAULT_SERVICE: &str = "host";

/// Defaults applied to every client and server built with [`crate::ClientBuilder::with_config`].
///
/// Deserializes from any serde format, with `options` written as a comma separated list:
/// `{ "protocol": "ntlm", "options": "use_ntlm,session_key" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    pub protocol: ProtocolName,
    #[serde(deserialize_with = "deserialize_options")]
    pub options: NegotiateOptions,
    pub service: String,
    pub hostname: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolName::Negotiate,
            options: NegotiateOptions::empty(),
            service: DEFAULT_SERVICE.to_owned(),
            hostname: DEFAULT_HOSTNAME.to_owned(),
        }
    }
}

impl FactoryConfig {
    /// Reads `SPNEGO_PROTOCOL`, `SPNEGO_OPTIONS`, `SPNEGO_SERVICE` and `SPNEGO_HOSTNAME`.
    ///
    /// Unset or empty variables keep their defaults. An unknown protocol or option name is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(protocol) = var(PROTOCOL_ENV) {
            config.protocol = protocol.trim().parse()?;
        }

        if let Some(options) = var(OPTIONS_ENV) {
            config.options = options.parse()?;
        }

        if let Some(service) = var(SERVICE_ENV) {
            config.service = service;
        }

        if let Some(hostname) = var(HOSTNAME_ENV) {
            config.hostname = hostname;
        }

        debug!(?config, "loaded configuration from environment");

        Ok(config)
    }
}

fn deserialize_options<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NegotiateOptions, D::Error> {
    let options = String::deserialize(deserializer)?;

    options.parse().map_err(serde::de::Error::custom)
}
