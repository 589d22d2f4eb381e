use switchboard_common::LogLevel;
use switchboard_server::cli::CliArgs;
use switchboard_server::config::{Config, ConfigError};
use switchboard_server::build_dispatcher;
use switchboard_test_support::TempConfig;

#[test]
fn file_and_flags_combine() {
    let file = TempConfig::new(
        r#"
        [server]
        name = "from-file"

        [logging]
        level = "warning"

        [dispatch]
        max_batch_concurrency = 3
        "#,
    );
    let args = CliArgs {
        config: Some(file.path.clone()),
        server_name: Some("from-flag".to_string()),
        ..CliArgs::default()
    };

    let config = Config::resolve(&args).unwrap();
    assert_eq!(config.server.name, "from-flag");
    assert_eq!(config.logging.level, LogLevel::Warning);
    assert_eq!(config.dispatch.max_batch_concurrency, 3);

    let dispatcher = build_dispatcher(&config).unwrap();
    assert_eq!(dispatcher.server_info().name, "from-flag");
}

#[test]
fn missing_file_is_an_io_error() {
    let file = TempConfig::new("");
    let args = CliArgs {
        config: Some(file.missing_sibling()),
        ..CliArgs::default()
    };
    let err = Config::resolve(&args).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn flag_cannot_make_an_invalid_value_valid_again() {
    let file = TempConfig::new("[dispatch]\nmax_batch_concurrency = 0\n");
    let args = CliArgs {
        config: Some(file.path.clone()),
        max_batch_concurrency: Some(4),
        ..CliArgs::default()
    };
    // The file is validated on its own before flags are applied.
    assert!(matches!(
        Config::resolve(&args),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn empty_token_flag_is_rejected() {
    let args = CliArgs {
        auth_token: Some(String::new()),
        ..CliArgs::default()
    };
    assert!(Config::resolve(&args).is_err());
}
