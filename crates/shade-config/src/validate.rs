//! Configuration validation, one entry point per role.

use crate::endpoint::{node_cipher_suite, resolve_endpoint, split_tunnel_spec};
use crate::loader::ConfigError;
use crate::types::Config;

pub fn validate_server(config: &Config) -> Result<(), ConfigError> {
    let server = config
        .server
        .as_ref()
        .ok_or_else(|| ConfigError::Validation("missing [server] section".into()))?;
    if server.listen.trim().is_empty() {
        return Err(ConfigError::Validation("server.listen is empty".into()));
    }
    if server.cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "server.cache_ttl_secs must be > 0".into(),
        ));
    }
    node_cipher_suite(&config.node)?;
    validate_replay(config)
}

pub fn validate_client(config: &Config) -> Result<(), ConfigError> {
    let client = config
        .client
        .as_ref()
        .ok_or_else(|| ConfigError::Validation("missing [client] section".into()))?;
    if client.socks_listen.trim().is_empty() && client.tunnels.is_empty() {
        return Err(ConfigError::Validation(
            "client needs a socks_listen address or at least one tunnel".into(),
        ));
    }
    resolve_endpoint(&client.server, &config.node)?.cipher_suite()?;
    for spec in &client.tunnels {
        split_tunnel_spec(spec)?;
    }
    validate_replay(config)
}

pub fn validate_jumper(config: &Config) -> Result<(), ConfigError> {
    let jumper = config
        .jumper
        .as_ref()
        .ok_or_else(|| ConfigError::Validation("missing [jumper] section".into()))?;
    if jumper.listen.trim().is_empty() {
        return Err(ConfigError::Validation("jumper.listen is empty".into()));
    }
    node_cipher_suite(&config.node)?;
    resolve_endpoint(&jumper.next_hop, &config.node)?.cipher_suite()?;
    validate_replay(config)
}

pub fn validate_reverse(config: &Config) -> Result<(), ConfigError> {
    let reverse = config
        .reverse
        .as_ref()
        .ok_or_else(|| ConfigError::Validation("missing [reverse] section".into()))?;
    resolve_endpoint(&reverse.server, &config.node)?.cipher_suite()?;
    validate_replay(config)
}

fn validate_replay(config: &Config) -> Result<(), ConfigError> {
    let replay = &config.replay;
    if !replay.enabled {
        return Ok(());
    }
    if replay.generations == 0 {
        return Err(ConfigError::Validation(
            "replay.generations must be > 0".into(),
        ));
    }
    if replay.capacity == 0 {
        return Err(ConfigError::Validation("replay.capacity must be > 0".into()));
    }
    if !(replay.false_positive_rate > 0.0 && replay.false_positive_rate < 1.0) {
        return Err(ConfigError::Validation(
            "replay.false_positive_rate must be in (0, 1)".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn accepts_a_complete_config() {
        let config = parse(
            r#"
[node]
password = "hunter2"

[server]
listen = "0.0.0.0:8488"

[client]
server = "example.com:8488"

[jumper]
listen = "0.0.0.0:8489"
next_hop = "example.com:8488"

[reverse]
server = "example.com:8488"
"#,
        );
        validate_server(&config).unwrap();
        validate_client(&config).unwrap();
        validate_jumper(&config).unwrap();
        validate_reverse(&config).unwrap();
    }

    #[test]
    fn each_role_requires_its_section() {
        let config = parse("[node]\npassword = \"x\"\n");
        assert!(validate_server(&config).is_err());
        assert!(validate_client(&config).is_err());
        assert!(validate_jumper(&config).is_err());
        assert!(validate_reverse(&config).is_err());
    }

    #[test]
    fn server_rejects_empty_listen() {
        let config = parse(
            r#"
[node]
password = "x"

[server]
listen = "  "
"#,
        );
        assert!(validate_server(&config).is_err());
    }

    #[test]
    fn missing_secret_is_rejected() {
        let config = parse(
            r#"
[server]
listen = "0.0.0.0:8488"
"#,
        );
        assert!(validate_server(&config).is_err());
    }

    #[test]
    fn plain_cipher_passes_without_a_secret() {
        let config = parse(
            r#"
[node]
cipher = "plain"

[server]
listen = "0.0.0.0:8488"
"#,
        );
        validate_server(&config).unwrap();
    }

    #[test]
    fn unknown_cipher_is_rejected() {
        let config = parse(
            r#"
[node]
cipher = "rot13"
password = "x"

[server]
listen = "0.0.0.0:8488"
"#,
        );
        assert!(validate_server(&config).is_err());
    }

    #[test]
    fn client_needs_socks_or_tunnels() {
        let config = parse(
            r#"
[node]
password = "x"

[client]
server = "example.com:8488"
socks_listen = ""
"#,
        );
        assert!(validate_client(&config).is_err());
    }

    #[test]
    fn tunnel_only_client_is_accepted() {
        let config = parse(
            r#"
[node]
password = "x"

[client]
server = "example.com:8488"
socks_listen = ""
tunnels = ["127.0.0.1:2222=10.0.0.9:22"]
"#,
        );
        validate_client(&config).unwrap();
    }

    #[test]
    fn malformed_tunnel_spec_is_rejected() {
        let config = parse(
            r#"
[node]
password = "x"

[client]
server = "example.com:8488"
tunnels = ["no-equals-here"]
"#,
        );
        assert!(validate_client(&config).is_err());
    }

    #[test]
    fn replay_sizing_is_checked_when_enabled() {
        let config = parse(
            r#"
[node]
password = "x"

[server]
listen = "0.0.0.0:8488"

[replay]
generations = 0
"#,
        );
        assert!(validate_server(&config).is_err());

        let config = parse(
            r#"
[node]
password = "x"

[server]
listen = "0.0.0.0:8488"

[replay]
false_positive_rate = 1.5
"#,
        );
        assert!(validate_server(&config).is_err());
    }

    #[test]
    fn disabled_replay_skips_sizing_checks() {
        let config = parse(
            r#"
[node]
password = "x"

[server]
listen = "0.0.0.0:8488"

[replay]
enabled = false
generations = 0
capacity = 0
"#,
        );
        validate_server(&config).unwrap();
    }
}
