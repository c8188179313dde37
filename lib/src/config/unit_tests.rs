use {
    super::BridgeConfig,
    crate::error::{BridgeConfigError, HttpConfigError},
    std::{fs::File, io::Write, time::Duration},
    tempfile::tempdir,
};

#[test]
fn error_when_config_files_cannot_be_read() {
    match BridgeConfig::from_file("nonexistent.toml") {
        Err(BridgeConfigError::IoError { path, .. }) if path == "nonexistent.toml" => {}
        res => panic!("unexpected result: {:?}", res),
    }
}

#[test]
fn an_empty_config_permits_everything() {
    let config = BridgeConfig::from_str("").expect("can read an empty file");
    let policy = config.policy();
    assert!(policy.allowed_hosts().is_empty());
    assert!(policy.allowed_methods().is_empty());
    assert!(policy.is_host_allowed("anywhere.example:443"));
    assert_eq!(config.timeout(), None);
}

#[test]
fn config_files_can_be_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.toml");
    let mut file = File::create(&path).unwrap();
    writeln!(
        file,
        r#"
        [http]
        allowed_hosts = ["localhost:8080", "github.com:443"]
        allowed_methods = ["GET", "DELETE"]
        timeout_ms = 2500
        "#
    )
    .unwrap();

    let config = BridgeConfig::from_file(&path).expect("can read toml file");
    let policy = config.policy();
    assert_eq!(policy.allowed_hosts(), ["localhost:8080", "github.com:443"]);
    assert_eq!(policy.allowed_methods(), ["GET", "DELETE"]);
    assert!(policy.check("GET", "github.com:443").is_ok());
    assert!(policy.check("POST", "github.com:443").is_err());
    assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
}

#[test]
fn sections_other_than_http_are_ignored() {
    let config = BridgeConfig::from_str(
        r#"
        name = "some-component"
        [http]
        allowed_methods = ["GET"]
        "#,
    )
    .expect("can read toml data with extra sections");
    assert_eq!(config.policy().allowed_methods(), ["GET"]);
}

/// Unit tests for the `[http]` section.
mod http_config_tests {
    use super::*;

    fn read_http_section(toml: &str) -> Result<BridgeConfig, BridgeConfigError> {
        BridgeConfig::from_str(format!("[http]\n{}", toml))
    }

    #[test]
    fn unrecognized_keys_are_rejected() {
        match read_http_section(r#"allowed_hostz = ["example.com:443"]"#) {
            Err(BridgeConfigError::InvalidHttpDefinition(HttpConfigError::UnrecognizedKey(key)))
                if key == "allowed_hostz" => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn hosts_must_be_a_list_of_strings() {
        use HttpConfigError::InvalidHostsEntry;
        match read_http_section(r#"allowed_hosts = "example.com:443""#) {
            Err(BridgeConfigError::InvalidHttpDefinition(InvalidHostsEntry)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
        match read_http_section(r#"allowed_hosts = [443]"#) {
            Err(BridgeConfigError::InvalidHttpDefinition(InvalidHostsEntry)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn empty_entries_are_rejected() {
        match read_http_section(r#"allowed_hosts = ["  "]"#) {
            Err(BridgeConfigError::InvalidHttpDefinition(HttpConfigError::EmptyHost)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
        match read_http_section(r#"allowed_methods = [""]"#) {
            Err(BridgeConfigError::InvalidHttpDefinition(HttpConfigError::EmptyMethod)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn methods_must_be_a_list_of_strings() {
        match read_http_section(r#"allowed_methods = { get = true }"#) {
            Err(BridgeConfigError::InvalidHttpDefinition(HttpConfigError::InvalidMethodsEntry)) => {
            }
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn timeouts_must_be_positive_integers() {
        for bad in ["timeout_ms = 0", "timeout_ms = -5", r#"timeout_ms = "10s""#] {
            match read_http_section(bad) {
                Err(BridgeConfigError::InvalidHttpDefinition(
                    HttpConfigError::InvalidTimeoutEntry,
                )) => {}
                res => panic!("unexpected result for {}: {:?}", bad, res),
            }
        }
    }

    #[test]
    fn http_section_must_be_a_table() {
        match BridgeConfig::from_str("http = 5") {
            Err(BridgeConfigError::InvalidToml(_)) => {}
            res => panic!("unexpected result: {:?}", res),
        }
    }
}
