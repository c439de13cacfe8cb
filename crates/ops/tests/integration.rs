//! Integration tests for ops crate

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use taphouse_config::Config;
    use taphouse_errors::{Error, OpsError, ReconcileError};
    use taphouse_events::{channel, AppEvent, EventReceiver, ReconcileEvent};
    use taphouse_ops::*;
    use taphouse_platform::{
        PlatformCommand, PlatformContext, ProcessLauncher, ProcessRunner, RunningProcess,
    };
    use taphouse_state::{RefreshedState, StateStore};
    use taphouse_types::{
        InstalledPackage, OperationKind, OperationStatus, OutdatedPackage, OutputLine,
        PackageKind, ServiceAction, ServiceInfo, ServiceStatus, TerminationReason,
    };

    #[derive(Default)]
    struct FakeQuery {
        installed_calls: AtomicUsize,
        outdated_calls: AtomicUsize,
        services_calls: AtomicUsize,
        fail: bool,
    }

    impl FakeQuery {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn passes(&self) -> usize {
            self.installed_calls.load(Ordering::SeqCst)
                + self.outdated_calls.load(Ordering::SeqCst)
                + self.services_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PackageQuery for FakeQuery {
        async fn list_installed_packages(&self) -> Result<Vec<InstalledPackage>, ReconcileError> {
            self.installed_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReconcileError::QueryFailed {
                    query: "installed".into(),
                    message: "brew exploded".into(),
                });
            }
            Ok(vec![InstalledPackage {
                name: "foo".into(),
                kind: PackageKind::Formula,
                versions: vec!["1.0".into()],
            }])
        }

        async fn list_outdated_packages(&self) -> Result<Vec<OutdatedPackage>, ReconcileError> {
            self.outdated_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn list_services(&self) -> Result<Vec<ServiceInfo>, ReconcileError> {
            self.services_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ServiceInfo {
                name: "redis".into(),
                status: ServiceStatus::Started,
                user: None,
                file: None,
                exit_code: None,
            }])
        }
    }

    struct CountingLauncher {
        inner: ProcessRunner,
        spawns: AtomicUsize,
    }

    impl ProcessLauncher for CountingLauncher {
        fn start(&self, ctx: &PlatformContext, cmd: PlatformCommand) -> RunningProcess {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            self.inner.start(ctx, cmd)
        }
    }

    #[derive(Default)]
    struct Recorded {
        lines: Vec<(usize, String)>,
        states: Vec<OperationStatus>,
        reconciled: Vec<bool>,
    }

    struct Recorder(Arc<Mutex<Recorded>>);

    impl OperationObserver for Recorder {
        fn on_lines(&mut self, first_index: usize, lines: &[OutputLine]) {
            let mut recorded = self.0.lock().unwrap();
            for (offset, line) in lines.iter().enumerate() {
                recorded.lines.push((first_index + offset, line.text.clone()));
            }
        }

        fn on_state_change(&mut self, _from: OperationStatus, to: OperationStatus) {
            self.0.lock().unwrap().states.push(to);
        }

        fn on_reconciled(&mut self, outcome: &Result<RefreshedState, ReconcileError>) {
            self.0.lock().unwrap().reconciled.push(outcome.is_ok());
        }
    }

    struct Harness {
        ctx: OpsCtx,
        query: Arc<FakeQuery>,
        launcher: Arc<CountingLauncher>,
        _rx: EventReceiver,
    }

    impl Harness {
        fn spawns(&self) -> usize {
            self.launcher.spawns.load(Ordering::SeqCst)
        }
    }

    fn harness_with(config: Config, query: FakeQuery) -> Harness {
        let (tx, rx) = channel();
        let query = Arc::new(query);
        let launcher = Arc::new(CountingLauncher {
            inner: ProcessRunner::new(&config.runner),
            spawns: AtomicUsize::new(0),
        });
        let ctx = OpsContextBuilder::new()
            .with_config(config)
            .with_event_sender(tx)
            .with_launcher(launcher.clone())
            .with_query(query.clone())
            .build()
            .unwrap();
        Harness {
            ctx,
            query,
            launcher,
            _rx: rx,
        }
    }

    fn harness() -> Harness {
        harness_with(Config::default(), FakeQuery::default())
    }

    fn sh(kind: OperationKind, script: &str) -> OperationRequest {
        let mut cmd = PlatformCommand::new("/bin/sh");
        cmd.args(["-c", script]);
        OperationRequest::new(kind, cmd)
    }

    fn install_foo(script: &str) -> OperationRequest {
        sh(
            OperationKind::Install {
                packages: vec!["foo".into()],
            },
            script,
        )
    }

    fn recorder(controller: &mut OperationController) -> Arc<Mutex<Recorded>> {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        controller.subscribe(Recorder(recorded.clone()));
        recorded
    }

    #[tokio::test]
    async fn test_successful_operation_reconciles_once() {
        let h = harness();
        let mut controller = h.ctx.controller();
        let recorded = recorder(&mut controller);

        let report = controller
            .run(install_foo("echo 'Installing foo'"))
            .await
            .unwrap();

        assert_eq!(report.status, OperationStatus::Succeeded);
        assert_eq!(report.exit_code, 0);
        assert!(report.error.is_none());
        assert!(matches!(
            report.reconciliation,
            Reconciliation::Refreshed { .. }
        ));

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.lines, vec![(0, "Installing foo".to_string())]);
        assert_eq!(
            recorded.states,
            [OperationStatus::Running, OperationStatus::Succeeded]
        );
        assert_eq!(recorded.reconciled, [true]);

        // install re-reads installed and outdated exactly once
        assert_eq!(h.query.installed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.query.outdated_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.query.services_calls.load(Ordering::SeqCst), 0);

        let snapshot = h.ctx.state.snapshot();
        assert_eq!(snapshot.installed.items[0].name, "foo");
        assert!(snapshot.outdated.is_loaded());
        assert!(!snapshot.services.is_loaded());
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_without_reconciling() {
        let h = harness();
        let mut controller = h.ctx.controller();

        let report = controller.run(install_foo("exit 1")).await.unwrap();

        assert_eq!(report.status, OperationStatus::Failed);
        assert_eq!(report.exit_code, 1);
        assert_eq!(report.reason, TerminationReason::Exited);
        assert!(matches!(
            report.error,
            Some(OpsError::NonZeroExit { exit_code: 1, .. })
        ));
        assert!(matches!(report.reconciliation, Reconciliation::Skipped));
        assert_eq!(h.query.passes(), 0);
        assert_eq!(controller.status(), OperationStatus::Failed);
    }

    #[tokio::test]
    async fn test_failure_keeps_diagnostic_tail() {
        let mut config = Config::default();
        config.runner.diagnostic_lines = 2;
        let h = harness_with(config, FakeQuery::default());
        let mut controller = h.ctx.controller();

        let report = controller
            .run(install_foo(
                "echo one; echo two; echo 'Error: No available formula' >&2; exit 1",
            ))
            .await
            .unwrap();

        assert_eq!(report.tail, ["two", "Error: No available formula"]);
        assert_eq!(report.lines, 3);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_without_spawning() {
        let h = harness();
        let mut controller = h.ctx.controller();

        controller
            .start(install_foo("echo first; sleep 0.2; echo done"))
            .unwrap();
        let err = controller
            .start(install_foo("echo second"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Ops(OpsError::AlreadyRunning { .. })
        ));
        assert_eq!(h.spawns(), 1);

        let report = controller.finish().await.unwrap();
        assert_eq!(report.status, OperationStatus::Succeeded);
        let texts: Vec<_> = controller
            .current_output_lines()
            .iter()
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(texts, ["first", "done"]);
        assert_eq!(h.spawns(), 1);
    }

    #[tokio::test]
    async fn test_cancel_long_running_operation() {
        let h = harness();
        let mut controller = h.ctx.controller();
        let recorded = recorder(&mut controller);

        controller
            .start(install_foo("echo before; sleep 30; echo after"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(controller.cancel());
        // status is driven by the exit, not set eagerly
        assert_eq!(controller.status(), OperationStatus::Running);

        let report = tokio::time::timeout(Duration::from_secs(10), controller.finish())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.status, OperationStatus::Cancelled);
        assert_eq!(report.reason, TerminationReason::Cancelled);
        assert!(matches!(report.error, Some(OpsError::Cancelled { .. })));
        assert_eq!(h.query.passes(), 0);

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.lines, vec![(0, "before".to_string())]);
        assert_eq!(recorded.states.last(), Some(&OperationStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_external_timeout_through_cancel_handle() {
        let h = harness();
        let mut controller = h.ctx.controller();
        controller.start(install_foo("sleep 30")).unwrap();

        let handle = controller.cancel_handle().unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let report = controller.finish().await.unwrap();
        assert_eq!(report.status, OperationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_finish_raced_against_timer_can_be_cancelled() {
        let h = harness();
        let mut controller = h.ctx.controller();
        let recorded = recorder(&mut controller);
        controller
            .start(install_foo("echo before; sleep 30"))
            .unwrap();

        let raced = tokio::time::timeout(Duration::from_millis(300), controller.finish()).await;
        assert!(raced.is_err());
        assert_eq!(controller.status(), OperationStatus::Running);
        assert!(controller.cancel_handle().is_some());
        assert!(!controller.dismiss());

        assert!(controller.cancel());
        let report = tokio::time::timeout(Duration::from_secs(10), controller.finish())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.status, OperationStatus::Cancelled);
        assert_eq!(report.reason, TerminationReason::Cancelled);
        assert_eq!(controller.status(), OperationStatus::Cancelled);
        assert_eq!(
            recorded.lock().unwrap().lines,
            vec![(0, "before".to_string())]
        );
    }

    #[tokio::test]
    async fn test_abandoned_finish_resumes_after_exit() {
        let h = harness();
        let mut controller = h.ctx.controller();
        controller
            .start(install_foo("echo one; sleep 0.5; echo two"))
            .unwrap();

        let raced = tokio::time::timeout(Duration::from_millis(100), controller.finish()).await;
        assert!(raced.is_err());
        tokio::time::sleep(Duration::from_millis(800)).await;

        let report = controller.finish().await.unwrap();
        assert_eq!(report.status, OperationStatus::Succeeded);
        let texts: Vec<_> = controller
            .current_output_lines()
            .iter()
            .map(|line| line.text.clone())
            .collect();
        assert_eq!(texts, vec!["one", "two"]);

        controller.start(install_foo("echo again")).unwrap();
        let report = controller.finish().await.unwrap();
        assert_eq!(report.status, OperationStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_dropping_controller_cancels_process() {
        let h = harness();
        let mut controller = h.ctx.controller();
        controller.start(install_foo("sleep 30")).unwrap();
        let handle = controller.cancel_handle().unwrap();

        drop(controller);
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_cancel_after_exit_is_noop() {
        let h = harness();
        let mut controller = h.ctx.controller();
        controller.start(install_foo("echo quick")).unwrap();
        let handle = controller.cancel_handle().unwrap();

        let report = controller.finish().await.unwrap();
        assert_eq!(report.status, OperationStatus::Succeeded);

        assert!(!handle.cancel());
        assert!(!controller.cancel());
        assert_eq!(controller.status(), OperationStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_lines_arrive_in_order_across_batches() {
        let mut config = Config::default();
        config.runner.batch_limit = 7;
        let h = harness_with(config, FakeQuery::default());
        let mut controller = h.ctx.controller();
        let recorded = recorder(&mut controller);

        let report = controller
            .run(install_foo(
                "i=0; while [ $i -lt 500 ]; do echo line$i; [ $((i % 3)) -eq 0 ] && echo err$i >&2; i=$((i+1)); done",
            ))
            .await
            .unwrap();
        assert_eq!(report.status, OperationStatus::Succeeded);

        let recorded = recorded.lock().unwrap();
        let expected: Vec<String> = (0..500)
            .flat_map(|i| {
                let mut lines = vec![format!("line{i}")];
                if i % 3 == 0 {
                    lines.push(format!("err{i}"));
                }
                lines
            })
            .collect();
        let indices: Vec<usize> = recorded.lines.iter().map(|(i, _)| *i).collect();
        let texts: Vec<String> = recorded.lines.iter().map(|(_, t)| t.clone()).collect();
        assert_eq!(indices, (0..expected.len()).collect::<Vec<_>>());
        assert_eq!(texts, expected);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_truncate_output() {
        let h = harness();
        let mut controller = h.ctx.controller();

        let report = controller
            .run(install_foo(r"printf 'caf\303\n\377\377\n'; echo after"))
            .await
            .unwrap();

        assert_eq!(report.status, OperationStatus::Succeeded);
        let lines = controller.current_output_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].text.contains('\u{FFFD}'));
        assert_eq!(lines[2].text, "after");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_a_failed_operation() {
        let h = harness();
        let mut controller = h.ctx.controller();

        let request = OperationRequest::custom(
            "Run pkgtool",
            PlatformCommand::new("/nonexistent/pkgtool"),
        )
        .unwrap();
        controller.start(request).unwrap();
        let report = controller.finish().await.unwrap();

        assert_eq!(report.status, OperationStatus::Failed);
        assert_eq!(report.exit_code, 127);
        assert!(matches!(
            report.error,
            Some(OpsError::SpawnFailure { .. })
        ));
        assert_eq!(h.query.passes(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_failure_does_not_change_status() {
        let h = harness_with(Config::default(), FakeQuery::failing());
        let mut controller = h.ctx.controller();
        let recorded = recorder(&mut controller);

        let report = controller.run(install_foo("echo ok")).await.unwrap();

        assert_eq!(report.status, OperationStatus::Succeeded);
        assert!(report.error.is_none());
        assert!(report.reconciliation.is_failed());
        assert_eq!(recorded.lock().unwrap().reconciled, [false]);
        // nothing from the failed pass reaches the store
        assert_eq!(h.ctx.state.snapshot().generation, 0);
    }

    #[tokio::test]
    async fn test_restart_and_dismiss() {
        let h = harness();
        let mut controller = h.ctx.controller();
        let recorded = recorder(&mut controller);

        controller.run(install_foo("echo one; exit 2")).await.unwrap();
        assert_eq!(controller.current_output_lines().len(), 1);

        controller.run(install_foo("echo two")).await.unwrap();
        let texts: Vec<_> = controller
            .current_output_lines()
            .iter()
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(texts, ["two"]);

        assert!(controller.dismiss());
        assert_eq!(controller.status(), OperationStatus::Idle);
        assert!(controller.current_output_lines().is_empty());
        assert!(controller.operation().kind.is_none());

        assert_eq!(
            recorded.lock().unwrap().states,
            [
                OperationStatus::Running,
                OperationStatus::Failed,
                OperationStatus::Idle,
                OperationStatus::Running,
                OperationStatus::Succeeded,
                OperationStatus::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_finish_without_start() {
        let h = harness();
        let mut controller = h.ctx.controller();
        assert!(matches!(
            controller.finish().await,
            Err(Error::Ops(OpsError::NotRunning))
        ));
        assert!(!controller.cancel());
        assert!(controller.cancel_handle().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        let h = harness();
        let mut controller = h.ctx.controller();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = controller.subscribe(observe_with(
            move |line: &OutputLine| sink.lock().unwrap().push(line.text.clone()),
            |_status| {},
        ));

        controller.run(install_foo("echo first")).await.unwrap();
        assert!(controller.unsubscribe(id));
        assert!(!controller.unsubscribe(id));
        controller.run(install_foo("echo second")).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), ["first"]);
    }

    #[tokio::test]
    async fn test_service_control_waits_before_requery() {
        let mut config = Config::default();
        config.reconcile.service_settle_ms = 30;
        let (tx, mut rx) = channel();
        let query = Arc::new(FakeQuery::default());
        let reconciler =
            ResultReconciler::new(query.clone(), StateStore::new(), &config.reconcile)
                .with_event_sender(tx);

        let started = std::time::Instant::now();
        let refreshed = reconciler
            .reconcile(&OperationKind::ServiceControl {
                action: ServiceAction::Restart,
                service: "redis".into(),
            })
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(refreshed.sections(), ["services"]);
        assert_eq!(query.services_calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.installed_calls.load(Ordering::SeqCst), 0);

        let mut settled = false;
        while let Ok(message) = rx.try_recv() {
            if let AppEvent::Reconcile(ReconcileEvent::Settling { delay_ms }) = message.event {
                assert_eq!(delay_ms, 30);
                settled = true;
            }
        }
        assert!(settled);
    }

    #[tokio::test]
    async fn test_refresh_all_reads_every_section() {
        let h = harness();
        let refreshed = h.ctx.reconciler().refresh_all().await.unwrap();
        assert_eq!(refreshed.sections(), ["installed", "outdated", "services"]);

        let snapshot = h.ctx.state.snapshot();
        assert!(snapshot.installed.is_loaded());
        assert!(snapshot.outdated.is_loaded());
        assert_eq!(snapshot.services.items[0].name, "redis");
    }

    #[tokio::test]
    async fn test_refresh_reads_only_requested_section() {
        let h = harness();
        let refreshed = h
            .ctx
            .reconciler()
            .refresh(&[StateQuery::Services])
            .await
            .unwrap();
        assert_eq!(refreshed.sections(), ["services"]);
        assert_eq!(h.query.passes(), 1);
        assert_eq!(h.query.services_calls.load(Ordering::SeqCst), 1);

        let snapshot = h.ctx.state.snapshot();
        assert!(!snapshot.installed.is_loaded());
        assert_eq!(snapshot.services.items[0].name, "redis");
    }

    #[test]
    fn test_builder_requires_event_sender() {
        let result = OpsContextBuilder::new().build();
        assert!(matches!(
            result,
            Err(Error::Ops(OpsError::MissingComponent { .. }))
        ));
    }

    /// Stand-in for `brew`: `sh <subcommand> <args>` runs the script named
    /// after the subcommand from the working directory.
    fn fake_brew(dir: &std::path::Path) -> taphouse_config::BrewConfig {
        std::fs::write(
            dir.join("list"),
            r#"case "$1" in
  --formula) echo "wget 1.24.5"; echo "python@3.12 3.12.1 3.12.2" ;;
  --cask) echo "firefox 121.0" ;;
esac
echo "Warning: unrelated noise" >&2
"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("outdated"),
            r#"echo '{"formulae":[{"name":"wget","installed_versions":["1.24.5"],"current_version":"1.25.0","pinned":false}],"casks":[]}'
echo "Warning: unrelated noise" >&2
"#,
        )
        .unwrap();
        std::fs::write(dir.join("services"), "echo 'Error: launchctl failed' >&2\nexit 1\n")
            .unwrap();

        taphouse_config::BrewConfig {
            executable: "/bin/sh".into(),
            working_dir: Some(dir.to_path_buf()),
            ..taphouse_config::BrewConfig::default()
        }
    }

    #[tokio::test]
    async fn test_brew_query_parses_stdout_only() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::default().with_merge_stderr(false);
        let query = BrewQuery::new(Arc::new(runner), fake_brew(dir.path()));

        let installed = query.list_installed_packages().await.unwrap();
        let names: Vec<_> = installed.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["wget", "python@3.12", "firefox"]);
        assert_eq!(installed[2].kind, PackageKind::Cask);

        let outdated = query.list_outdated_packages().await.unwrap();
        assert_eq!(outdated[0].current_version, "1.25.0");

        let err = query.list_services().await.unwrap_err();
        assert_eq!(err.query(), "services");
        assert!(err.to_string().contains("launchctl failed"));
    }
}
