//! Integration tests for error types

#[cfg(test)]
mod tests {
    use taphouse_errors::*;

    #[test]
    fn test_error_conversion() {
        let ops_err = OpsError::AlreadyRunning {
            label: "Installing jq".into(),
        };
        let err: Error = ops_err.into();
        assert!(matches!(err, Error::Ops(OpsError::AlreadyRunning { .. })));
        assert_eq!(err.user_code(), Some("ops.already_running"));
    }

    #[test]
    fn test_spawn_error_classification() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = PlatformError::from_spawn("pkgtool", &not_found);
        assert_eq!(
            err,
            PlatformError::CommandNotFound {
                command: "pkgtool".into()
            }
        );
        assert_eq!(err.spawn_exit_code(), 127);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = PlatformError::from_spawn("pkgtool", &denied);
        assert!(matches!(err, PlatformError::PermissionDenied { .. }));
        assert_eq!(err.spawn_exit_code(), 126);
    }

    #[test]
    fn test_non_zero_exit_message_uses_last_line() {
        let err = OpsError::NonZeroExit {
            label: "Installing foo".into(),
            exit_code: 1,
            tail: vec!["==> Fetching foo".into(), "Error: No such formula".into()],
        };
        assert_eq!(
            err.user_message(),
            "Installing foo exited with code 1: Error: No such formula"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_reconcile_error_is_distinct() {
        let err: Error = ReconcileError::QueryFailed {
            query: "services".into(),
            message: "exit 1".into(),
        }
        .into();
        assert!(matches!(err, Error::Reconcile(_)));
        assert_eq!(err.user_code(), Some("reconcile.query_failed"));
        assert!(err.user_message().contains("stale"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { path: None, .. }));
        assert!(err.is_retryable());
    }
}
