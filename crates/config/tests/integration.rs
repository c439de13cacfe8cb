//! Integration tests for config

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;
    use taphouse_config::*;
    use taphouse_types::{ColorChoice, OutputFormat};
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[general]
default_output = "plain"
color = "never"

[runner]
merge_stderr = false
diagnostic_lines = 5
terminate_grace_ms = 500

[reconcile]
service_settle_ms = 3000

[brew]
executable = "/usr/local/bin/brew"

[brew.env]
HOMEBREW_NO_ANALYTICS = "1"
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Plain);
        assert_eq!(config.general.color, ColorChoice::Never);
        assert!(!config.runner.merge_stderr);
        assert_eq!(config.runner.diagnostic_lines, 5);
        assert_eq!(config.runner.terminate_grace().as_millis(), 500);
        // untouched fields keep their defaults
        assert_eq!(config.runner.batch_limit, 64);
        assert_eq!(config.reconcile.service_settle().as_secs(), 3);
        assert_eq!(config.brew.executable, "/usr/local/bin/brew");
        assert_eq!(
            config.brew.env.get("HOMEBREW_NO_ANALYTICS").map(String::as_str),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from_file(&dir.path().join("nope.toml")).await;
        assert!(matches!(
            result,
            Err(taphouse_errors::Error::Config(
                taphouse_errors::ConfigError::NotFound { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_not_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from_file(dir.path()).await;
        match result {
            Err(taphouse_errors::Error::Config(taphouse_errors::ConfigError::ReadFailed {
                path,
                ..
            })) => assert_eq!(path, dir.path().display().to_string()),
            other => panic!("expected ReadFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::parse("[runner\nmerge_stderr = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::set_var("TAPHOUSE_COLOR", "always");

        let mut config = Config::default();
        config.merge_env().unwrap();
        assert_eq!(config.general.color, ColorChoice::Always);

        std::env::remove_var("TAPHOUSE_COLOR");
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::set_var("TAPHOUSE_OUTPUT", "invalid");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(result.is_err());

        std::env::remove_var("TAPHOUSE_OUTPUT");
    }
}
