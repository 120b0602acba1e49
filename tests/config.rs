use std::env;

use spnego::config::{HOSTNAME_ENV, OPTIONS_ENV, PROTOCOL_ENV, SERVICE_ENV};
use spnego::{ErrorKind, FactoryConfig, NegotiateOptions, ProtocolName};

// Environment variables are process wide, so every case lives in this one test.
#[test]
fn factory_config_from_env() {
    for name in [PROTOCOL_ENV, OPTIONS_ENV, SERVICE_ENV, HOSTNAME_ENV] {
        env::remove_var(name);
    }
    assert_eq!(FactoryConfig::from_env().unwrap(), FactoryConfig::default());

    env::set_var(PROTOCOL_ENV, "Kerberos");
    env::set_var(OPTIONS_ENV, "negotiate_kerberos,wrapping_winrm");
    env::set_var(SERVICE_ENV, "WSMAN");
    env::set_var(HOSTNAME_ENV, "server.example.com");

    let config = FactoryConfig::from_env().unwrap();
    assert_eq!(config.protocol, ProtocolName::Kerberos);
    assert_eq!(
        config.options,
        NegotiateOptions::NEGOTIATE_KERBEROS | NegotiateOptions::WRAPPING_WINRM
    );
    assert_eq!(config.service, "WSMAN");
    assert_eq!(config.hostname, "server.example.com");

    env::set_var(PROTOCOL_ENV, "basic");
    assert_eq!(
        FactoryConfig::from_env().unwrap_err().error_type,
        ErrorKind::InvalidProtocol
    );
}
