//! Immutable URI value type.
//!
//! A thin component wrapper, not an RFC 3986 implementation: the string is
//! split with the reference regular expression from RFC 3986 appendix B and
//! every component is kept verbatim. No percent-encoding or case
//! normalization happens here.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::MessageError;

static URI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([^:/?#]+):)?(?://([^/?#]*))?([^?#]*)(?:\?([^#]*))?(?:#(.*))?$")
        .expect("static URI pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    user_info: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: String,
    fragment: String,
}

impl Uri {
    /// Split `uri` into its components. Absent components are empty.
    pub fn parse(uri: &str) -> Result<Self, MessageError> {
        let invalid = || MessageError::InvalidUri(uri.to_string());
        let caps = URI_PATTERN.captures(uri).ok_or_else(invalid)?;
        let part = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();

        let mut parsed = Uri {
            scheme: part(1),
            path: part(3),
            query: part(4),
            fragment: part(5),
            ..Uri::default()
        };

        if let Some(authority) = caps.get(2).map(|m| m.as_str()) {
            let host_port = match authority.rsplit_once('@') {
                Some((user_info, rest)) => {
                    parsed.user_info = user_info.to_string();
                    rest
                }
                None => authority,
            };
            let (host, port) = split_host_port(host_port).ok_or_else(invalid)?;
            parsed.host = host.to_string();
            parsed.port = port;
        }

        Ok(parsed)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `[user-info@]host[:port]`, omitting empty parts.
    pub fn authority(&self) -> String {
        let mut authority = String::new();
        if !self.user_info.is_empty() {
            authority.push_str(&self.user_info);
            authority.push('@');
        }
        authority.push_str(&self.host);
        if let Some(port) = self.port {
            authority.push(':');
            authority.push_str(&port.to_string());
        }
        authority
    }

    pub fn user_info(&self) -> &str {
        &self.user_info
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn with_scheme(&self, scheme: &str) -> Self {
        Self { scheme: scheme.to_string(), ..self.clone() }
    }

    pub fn with_user_info(&self, user: &str, password: Option<&str>) -> Self {
        let user_info = match password {
            Some(password) => format!("{user}:{password}"),
            None => user.to_string(),
        };
        Self { user_info, ..self.clone() }
    }

    pub fn with_host(&self, host: &str) -> Self {
        Self { host: host.to_string(), ..self.clone() }
    }

    pub fn with_port(&self, port: Option<u16>) -> Self {
        Self { port, ..self.clone() }
    }

    pub fn with_path(&self, path: &str) -> Self {
        Self { path: path.to_string(), ..self.clone() }
    }

    pub fn with_query(&self, query: &str) -> Self {
        Self { query: query.to_string(), ..self.clone() }
    }

    pub fn with_fragment(&self, fragment: &str) -> Self {
        Self { fragment: fragment.to_string(), ..self.clone() }
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 literals intact.
fn split_host_port(host_port: &str) -> Option<(&str, Option<u16>)> {
    let port_sep = if host_port.starts_with('[') {
        let close = host_port.find(']')?;
        match &host_port[close + 1..] {
            "" => None,
            rest if rest.starts_with(':') => Some(close + 1),
            _ => return None,
        }
    } else {
        host_port.rfind(':')
    };

    match port_sep {
        None => Some((host_port, None)),
        Some(i) => {
            let digits = &host_port[i + 1..];
            if digits.is_empty() {
                return Some((&host_port[..i], None));
            }
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let port = digits.parse::<u16>().ok()?;
            Some((&host_port[..i], Some(port)))
        }
    }
}

impl FromStr for Uri {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        if !self.host.is_empty() {
            write!(f, "//{}", self.authority())?;
            if !self.path.is_empty() && !self.path.starts_with('/') {
                f.write_str("/")?;
            }
            f.write_str(&self.path)?;
        } else if self.path.starts_with("//") {
            // Without an authority a leading `//` would read as one.
            write!(f, "/{}", self.path.trim_start_matches('/'))?;
        } else {
            f.write_str(&self.path)?;
        }
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}
