//! Server endpoint resolution: flat "host:port" addresses and ss:// URLs.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use shade_crypto::{CipherSuite, Method};
use url::Url;

use crate::loader::ConfigError;
use crate::types::NodeConfig;

/// Secret material for a cipher: a password to expand, or raw key bytes.
#[derive(Debug, Clone)]
pub enum Secret {
    Password(String),
    Key(Vec<u8>),
}

/// A resolved server endpoint: where to dial and how to encrypt.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// "host:port" dial address.
    pub address: String,
    pub method: Method,
    pub secret: Option<Secret>,
}

impl Endpoint {
    /// Build the cipher suite for this endpoint.
    pub fn cipher_suite(&self) -> Result<CipherSuite, ConfigError> {
        match &self.secret {
            Some(Secret::Key(key)) => CipherSuite::new(self.method, key)
                .map_err(|e| ConfigError::Validation(e.to_string())),
            Some(Secret::Password(password)) => {
                Ok(CipherSuite::from_password(self.method, password))
            }
            None if self.method == Method::Plain => CipherSuite::new(Method::Plain, &[])
                .map_err(|e| ConfigError::Validation(e.to_string())),
            None => Err(ConfigError::Validation(format!(
                "cipher {} needs a password or key",
                self.method
            ))),
        }
    }
}

/// Resolve a configured server address against the node's cipher and secret.
///
/// `ss://cipher:password@host:port` URLs carry their own cipher and password,
/// which override the node fields. Flat "host:port" strings use the node
/// cipher with the node key (preferred) or password.
pub fn resolve_endpoint(raw: &str, node: &NodeConfig) -> Result<Endpoint, ConfigError> {
    if raw.starts_with("ss://") {
        return resolve_url(raw, node);
    }
    if raw.trim().is_empty() {
        return Err(ConfigError::Validation("server address is empty".into()));
    }
    Ok(Endpoint {
        address: raw.to_string(),
        method: parse_method(&node.cipher)?,
        secret: node_secret(node)?,
    })
}

/// Build the node's own cipher suite, for roles that listen rather than dial.
pub fn node_cipher_suite(node: &NodeConfig) -> Result<CipherSuite, ConfigError> {
    let endpoint = Endpoint {
        address: String::new(),
        method: parse_method(&node.cipher)?,
        secret: node_secret(node)?,
    };
    endpoint.cipher_suite()
}

/// Split a "local_addr=remote_host:port" tunnel entry.
pub fn split_tunnel_spec(spec: &str) -> Result<(&str, &str), ConfigError> {
    match spec.split_once('=') {
        Some((local, remote)) if !local.trim().is_empty() && !remote.trim().is_empty() => {
            Ok((local.trim(), remote.trim()))
        }
        _ => Err(ConfigError::Validation(format!(
            "tunnel spec must be local_addr=remote_addr, got {spec:?}"
        ))),
    }
}

fn resolve_url(raw: &str, node: &NodeConfig) -> Result<Endpoint, ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::Validation(format!("bad server URL: {e}")))?;
    let host = url
        .host()
        .ok_or_else(|| ConfigError::Validation("server URL has no host".into()))?;
    let port = url
        .port()
        .ok_or_else(|| ConfigError::Validation("server URL has no port".into()))?;

    let method = if url.username().is_empty() {
        parse_method(&node.cipher)?
    } else {
        parse_method(url.username())?
    };
    let secret = match url.password() {
        Some(password) => Some(Secret::Password(password.to_string())),
        None => node_secret(node)?,
    };

    Ok(Endpoint {
        address: format!("{host}:{port}"),
        method,
        secret,
    })
}

fn parse_method(name: &str) -> Result<Method, ConfigError> {
    name.parse()
        .map_err(|e: shade_crypto::CryptoError| ConfigError::Validation(e.to_string()))
}

fn node_secret(node: &NodeConfig) -> Result<Option<Secret>, ConfigError> {
    if let Some(key) = &node.key {
        let bytes = URL_SAFE
            .decode(key)
            .map_err(|e| ConfigError::Validation(format!("bad key encoding: {e}")))?;
        return Ok(Some(Secret::Key(bytes)));
    }
    Ok(node.password.clone().map(Secret::Password))
}
