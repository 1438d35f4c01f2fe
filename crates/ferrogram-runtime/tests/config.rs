//! Configuration loading tests. `figment::Jail` isolates the environment
//! and the working directory of each case.

use figment::Jail;

use ferrogram_runtime::config::{
    ConfigError, ConfigLoader, LogLevel, Mode, validate_config,
};
use ferrogram_runtime::{BotRuntime, RuntimeError};

#[test]
fn environment_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.set_env("FERROGRAM_BOT__TOKEN", "123:env");
        jail.set_env("FERROGRAM_MODE", "webhook");
        jail.set_env("FERROGRAM_WEBHOOK__URL", "https://bot.example.com/hook");
        jail.set_env("FERROGRAM_WEBHOOK__PORT", "8443");

        let config = ConfigLoader::new()
            .search_path(jail.directory())
            .load()
            .map_err(|e| e.to_string())?;

        assert_eq!(config.bot.token, "123:env");
        assert_eq!(config.mode, Mode::Webhook);
        assert_eq!(config.webhook.port, 8443);
        assert_eq!(config.webhook.route_path(), "/hook");
        assert!(validate_config(&config).is_ok());
        Ok(())
    });
}

#[test]
fn without_env_ignores_environment() {
    Jail::expect_with(|jail| {
        jail.set_env("FERROGRAM_BOT__TOKEN", "123:env");

        let config = ConfigLoader::new()
            .search_path(jail.directory())
            .without_env()
            .load()
            .map_err(|e| e.to_string())?;

        assert!(config.bot.token.is_empty());
        Ok(())
    });
}

#[test]
fn webhook_mode_without_port_fails_validation() {
    Jail::expect_with(|jail| {
        jail.set_env("FERROGRAM_BOT__TOKEN", "123:env");
        jail.set_env("FERROGRAM_MODE", "webhook");
        jail.set_env("FERROGRAM_WEBHOOK__URL", "https://bot.example.com/hook");

        let config = ConfigLoader::new()
            .search_path(jail.directory())
            .load()
            .map_err(|e| e.to_string())?;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort(0))
        ));
        Ok(())
    });
}

#[test]
fn webhook_mode_without_url_fails_validation() {
    Jail::expect_with(|jail| {
        jail.set_env("FERROGRAM_BOT__TOKEN", "123:env");
        jail.set_env("FERROGRAM_MODE", "webhook");
        jail.set_env("FERROGRAM_WEBHOOK__PORT", "8443");

        let config = ConfigLoader::new()
            .search_path(jail.directory())
            .load()
            .map_err(|e| e.to_string())?;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
        Ok(())
    });
}

#[test]
fn unsupported_file_format_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("bot.ini", "token = nope")?;

        let err = ConfigLoader::new()
            .without_env()
            .file(jail.directory().join("bot.ini"))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
        Ok(())
    });
}

#[test]
fn builder_validates_before_building() {
    Jail::expect_with(|jail| {
        let err = BotRuntime::builder()
            .search_path(jail.directory())
            .without_env()
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(ConfigError::MissingField { .. })));

        jail.set_env("FERROGRAM_BOT__TOKEN", "123:env");
        let runtime = BotRuntime::builder()
            .search_path(jail.directory())
            .build()
            .map_err(|e| e.to_string())?;
        assert_eq!(runtime.config().bot.token, "123:env");
        Ok(())
    });
}

#[cfg(feature = "toml-config")]
mod toml_files {
    use super::*;

    #[test]
    fn files_are_layered_under_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ferrogram.toml",
                r#"
                    mode = "polling"

                    [bot]
                    token = "123:file"

                    [polling]
                    limit = 50
                    allowed_updates = ["message", "callback_query"]

                    [dispatcher]
                    queue_capacity = 5

                    [logging]
                    level = "debug"

                    [logging.filters]
                    ferrogram_transport = "trace"
                "#,
            )?;
            jail.create_file(
                "ferrogram.production.toml",
                r#"
                    [dispatcher]
                    max_concurrent_handlers = 8
                "#,
            )?;
            jail.set_env("FERROGRAM_DISPATCHER__QUEUE_CAPACITY", "7");

            let config = ConfigLoader::new()
                .profile("production")
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.bot.token, "123:file");
            assert_eq!(config.polling.limit, Some(50));
            assert_eq!(config.polling.allowed_updates.len(), 2);
            assert_eq!(config.dispatcher.queue_capacity, 7);
            assert_eq!(config.dispatcher.max_concurrent_handlers, 8);
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(
                config.logging.filters.get("ferrogram_transport"),
                Some(&LogLevel::Trace)
            );
            assert!(validate_config(&config).is_ok());
            Ok(())
        });
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("ferrogram.toml", r#"mode = "carrier-pigeon""#)?;

            let err = ConfigLoader::new()
                .without_env()
                .search_path(jail.directory())
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::ParseError(_)));
            Ok(())
        });
    }
}
