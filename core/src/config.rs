//! Client configuration.
//!
//! A `Config` is passed to `LapostaClient::new` and owned by that client;
//! there is no process-wide default.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_API_HOST: &str = "api.laposta.nl";
pub const DEFAULT_API_PROTOCOL: &str = "https";
pub const DEFAULT_API_VERSION: &str = "v2";

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    api_key: String,
    api_host: String,
    api_protocol: String,
    api_version: String,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_host: DEFAULT_API_HOST.to_string(),
            api_protocol: DEFAULT_API_PROTOCOL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            connect_timeout: None,
            timeout: None,
        }
    }

    /// Read the configuration from `LAPOSTA_*` environment variables.
    /// Only `LAPOSTA_API_KEY` is required.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = env::var("LAPOSTA_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("LAPOSTA_API_KEY is not set".to_string()))?;

        let mut config = Self::new(api_key.trim());
        if let Some(host) = non_empty_var("LAPOSTA_API_HOST") {
            config = config.with_api_host(host);
        }
        if let Some(protocol) = non_empty_var("LAPOSTA_API_PROTOCOL") {
            config = config.with_api_protocol(protocol.to_ascii_lowercase());
        }
        if let Some(version) = non_empty_var("LAPOSTA_API_VERSION") {
            config = config.with_api_version(version);
        }
        config.connect_timeout = seconds_var("LAPOSTA_CONNECT_TIMEOUT_SECS")?;
        config.timeout = seconds_var("LAPOSTA_TIMEOUT_SECS")?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = host.into();
        self
    }

    pub fn with_api_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.api_protocol = protocol.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !matches!(self.api_protocol.as_str(), "http" | "https") {
            return Err(Error::Config(format!(
                "unsupported protocol {:?}; expected http or https",
                self.api_protocol
            )));
        }
        if self.api_host.is_empty() || self.api_host.contains(['/', ' ']) {
            return Err(Error::Config(format!("invalid API host {:?}", self.api_host)));
        }
        Ok(())
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = api_key.into();
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    pub fn api_protocol(&self) -> &str {
        &self.api_protocol
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// `/<version>`
    pub fn api_base_path(&self) -> String {
        format!("/{}", self.api_version)
    }

    /// `<protocol>://<host>/<version>`
    pub fn api_base_url(&self) -> String {
        format!("{}://{}{}", self.api_protocol, self.api_host, self.api_base_path())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_host", &self.api_host)
            .field("api_protocol", &self.api_protocol)
            .field("api_version", &self.api_version)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn seconds_var(name: &str) -> Result<Option<Duration>, Error> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(None);
    };
    let seconds: u64 = raw
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a whole number of seconds, got {raw:?}")))?;
    Ok(Some(Duration::from_secs(seconds)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "LAPOSTA_API_KEY",
        "LAPOSTA_API_HOST",
        "LAPOSTA_API_PROTOCOL",
        "LAPOSTA_API_VERSION",
        "LAPOSTA_CONNECT_TIMEOUT_SECS",
        "LAPOSTA_TIMEOUT_SECS",
    ];

    /// Every `LAPOSTA_*` variable, unset unless given in `set`.
    fn env_with(set: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
        VARS.iter()
            .map(|name| (*name, set.iter().find(|(k, _)| k == name).map(|(_, v)| *v)))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = Config::new("JdMtbsMq2jqJdQZD9AHC");
        assert_eq!(config.api_base_url(), "https://api.laposta.nl/v2");
        assert_eq!(config.api_base_path(), "/v2");
        assert_eq!(config.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_api_key() {
        let rendered = format!("{:?}", Config::new("secret-key"));
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn builder_overrides() {
        let config = Config::new("k")
            .with_api_protocol("http")
            .with_api_host("127.0.0.1:8080")
            .with_api_version("v3")
            .with_timeout(Some(Duration::from_secs(5)));
        assert_eq!(config.api_base_url(), "http://127.0.0.1:8080/v3");
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn rejects_unknown_protocol() {
        assert!(matches!(
            Config::new("k").with_api_protocol("ftp").validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn from_env_requires_key() {
        temp_env::with_vars(env_with(&[]), || {
            let err = Config::from_env().unwrap_err();
            assert_eq!(err.to_string(), "configuration error: LAPOSTA_API_KEY is not set");
        });
    }

    #[test]
    fn from_env_reads_all_settings() {
        let vars = env_with(&[
            ("LAPOSTA_API_KEY", "abc123"),
            ("LAPOSTA_API_HOST", "localhost:3000"),
            ("LAPOSTA_API_PROTOCOL", "HTTP"),
            ("LAPOSTA_CONNECT_TIMEOUT_SECS", "2"),
            ("LAPOSTA_TIMEOUT_SECS", "30"),
        ]);
        temp_env::with_vars(vars, || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.api_key(), "abc123");
            assert_eq!(config.api_base_url(), "http://localhost:3000/v2");
            assert_eq!(config.connect_timeout(), Some(Duration::from_secs(2)));
            assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        });
    }

    #[test]
    fn from_env_rejects_bad_timeout() {
        let vars = env_with(&[("LAPOSTA_API_KEY", "abc"), ("LAPOSTA_TIMEOUT_SECS", "soon")]);
        temp_env::with_vars(vars, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("LAPOSTA_TIMEOUT_SECS"));
        });
    }
}
