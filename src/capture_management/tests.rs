#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::io::AsyncRead;

    use crate::capture_management::{
        CaptureEngine, CaptureFilter, CaptureHandle, CaptureManager, CaptureRequest, ScratchDir,
        SessionState, SessionStore,
    };
    use crate::capture_management::filter::{FilterClause, FilterLogic};
    use crate::error_handling::types::CaptureError;
    use crate::network_control::environment::HostEnvironment;
    use crate::network_control::labels::{InterfaceLabels, MemoryLabels};

    // Shared counters so tests can observe what happened to the fake processes
    #[derive(Default)]
    struct Tally {
        started: AtomicUsize,
        terminated: AtomicUsize,
        killed: AtomicUsize,
        requests: Mutex<Vec<CaptureRequest>>,
    }

    struct FakeHandle {
        running: Arc<AtomicBool>,
        ignores_sigterm: bool,
        stderr: Option<Vec<u8>>,
        tally: Arc<Tally>,
    }

    #[async_trait]
    impl CaptureHandle for FakeHandle {
        fn pid(&self) -> Option<u32> {
            self.running.load(Ordering::SeqCst).then_some(4242)
        }

        fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
            self.stderr
                .take()
                .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn AsyncRead + Send + Unpin>)
        }

        fn is_running(&mut self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn terminate(&mut self) -> std::io::Result<()> {
            self.tally.terminated.fetch_add(1, Ordering::SeqCst);
            if !self.ignores_sigterm {
                self.running.store(false, Ordering::SeqCst);
            }
            Ok(())
        }

        fn kill(&mut self) -> std::io::Result<()> {
            self.tally.killed.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn wait_for_exit(&mut self, timeout: Duration) -> std::io::Result<bool> {
            if self.running.load(Ordering::SeqCst) {
                tokio::time::sleep(timeout).await;
                return Ok(!self.running.load(Ordering::SeqCst));
            }
            Ok(true)
        }
    }

    // Engine that writes a small artifact instead of running tcpdump
    struct FakeEngine {
        tally: Arc<Tally>,
        write_artifact: bool,
        ignores_sigterm: bool,
        fail_start: bool,
    }

    impl FakeEngine {
        fn new(tally: Arc<Tally>) -> Self {
            Self {
                tally,
                write_artifact: true,
                ignores_sigterm: false,
                fail_start: false,
            }
        }
    }

    impl CaptureEngine for FakeEngine {
        fn start(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError> {
            if self.fail_start {
                return Err(CaptureError::EngineStart(
                    "No such file or directory (os error 2)".to_string(),
                ));
            }
            if self.write_artifact {
                std::fs::write(&request.output_path, b"\xd4\xc3\xb2\xa1fake pcap")
                    .map_err(CaptureError::Directory)?;
            }
            self.tally.started.fetch_add(1, Ordering::SeqCst);
            self.tally.requests.lock().unwrap().push(request.clone());
            Ok(Box::new(FakeHandle {
                running: Arc::new(AtomicBool::new(true)),
                ignores_sigterm: self.ignores_sigterm,
                stderr: Some(b"tcpdump: listening on eth0\n".to_vec()),
                tally: Arc::clone(&self.tally),
            }))
        }
    }

    struct Fixture {
        _tmp: TempDir,
        tally: Arc<Tally>,
        labels: Arc<MemoryLabels>,
        manager: CaptureManager,
    }

    fn host() -> HostEnvironment {
        HostEnvironment {
            in_container: false,
            login_user: Some("tester".to_string()),
        }
    }

    fn fixture_with(configure: impl FnOnce(&mut FakeEngine), host: HostEnvironment) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let tmp = TempDir::new().unwrap();
        let tally = Arc::new(Tally::default());
        let mut engine = FakeEngine::new(Arc::clone(&tally));
        configure(&mut engine);
        let labels = Arc::new(MemoryLabels::with_defaults());
        let manager = CaptureManager::new(
            Arc::new(engine),
            Arc::new(SessionStore::new()),
            ScratchDir::new(tmp.path().join("hyyperwan_pcaps")),
            Arc::clone(&labels) as Arc<dyn InterfaceLabels>,
            host,
            Duration::from_secs(30),
        )
        .unwrap();
        Fixture {
            _tmp: tmp,
            tally,
            labels,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {}, host())
    }

    #[test]
    fn new_creates_scratch_directory() {
        let f = fixture();
        assert!(f.manager.scratch().path().is_dir());
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_start_stop_download() {
        let f = fixture();
        let filter = CaptureFilter {
            hosts: FilterClause::from_csv("10.0.0.5", FilterLogic::Or),
            ..Default::default()
        };

        let started = f.manager.start_capture("eth0", &filter).unwrap();
        assert_eq!(started.display_name, "eth0");
        assert_eq!(started.filter_expression, "host 10.0.0.5");
        let id = started.capture_id.to_string();

        let stopped = f.manager.stop_capture(&id).await.unwrap();
        assert_eq!(stopped.file_name, format!("capture_eth0_{}.pcap", id));
        assert!(stopped.file_size > 0);
        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 1);

        let listed = f.manager.list_captures();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, SessionState::Stopped);

        let downloaded = f.manager.download_capture(&id, None).await.unwrap();
        assert_eq!(downloaded.file_name, stopped.file_name);
        assert!(downloaded.contents.starts_with(b"\xd4\xc3\xb2\xa1"));
        assert!(f.manager.list_captures().is_empty());

        let artifact = f.manager.scratch().path().join(&stopped.file_name);
        assert!(artifact.exists());
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!artifact.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn second_download_by_id_is_not_found() {
        let f = fixture();
        let id = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap()
            .capture_id
            .to_string();
        f.manager.stop_capture(&id).await.unwrap();

        assert!(f.manager.download_capture(&id, None).await.is_ok());
        let second = f.manager.download_capture(&id, None).await;
        assert!(matches!(second, Err(CaptureError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn download_falls_back_to_file_name() {
        let f = fixture();
        let id = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap()
            .capture_id
            .to_string();
        let stopped = f.manager.stop_capture(&id).await.unwrap();
        f.manager.download_capture(&id, None).await.unwrap();

        // The registry entry is gone but the file is still on disk until cleanup
        let again = f
            .manager
            .download_capture(&id, Some(&stopped.file_name))
            .await
            .unwrap();
        assert_eq!(again.file_name, stopped.file_name);

        let traversal = f
            .manager
            .download_capture("unknown", Some("../../etc/passwd"))
            .await;
        assert!(matches!(traversal, Err(CaptureError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_unknown_id_is_not_found_without_side_effects() {
        let f = fixture();
        let active = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();

        let random = uuid::Uuid::new_v4().to_string();
        assert!(matches!(
            f.manager.stop_capture(&random).await,
            Err(CaptureError::NotFound(_))
        ));
        assert!(matches!(
            f.manager.stop_capture("not-a-uuid").await,
            Err(CaptureError::NotFound(_))
        ));

        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 0);
        assert!(f.manager.store().is_active(&active.capture_id));
        assert_eq!(f.manager.store().completed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn downloading_active_capture_is_a_conflict() {
        let f = fixture();
        let started = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();
        let id = started.capture_id.to_string();

        let result = f.manager.download_capture(&id, None).await;
        assert!(matches!(result, Err(CaptureError::Conflict(_))));

        let by_name = format!("capture_eth0_{}.pcap", id);
        let result = f.manager.download_capture("", Some(&by_name)).await;
        assert!(matches!(result, Err(CaptureError::Conflict(_))));

        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 0);
        assert!(f.manager.store().is_active(&started.capture_id));
    }

    #[tokio::test(start_paused = true)]
    async fn download_without_id_or_file_name() {
        let f = fixture();
        let result = f.manager.download_capture("nope", None).await;
        match result {
            Err(CaptureError::NotFound(msg)) => assert!(msg.starts_with("Filename not specified")),
            other => panic!("unexpected result: {:?}", other.map(|d| d.file_name)),
        }

        let result = f
            .manager
            .download_capture("nope", Some("capture_eth0_missing.pcap"))
            .await;
        assert!(matches!(result, Err(CaptureError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_stops_only_one_succeeds() {
        let f = fixture();
        let id = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap()
            .capture_id
            .to_string();

        let (a, b) = tokio::join!(f.manager.stop_capture(&id), f.manager.stop_capture(&id));
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(
            a.err().or(b.err()),
            Some(CaptureError::Conflict(_))
        ));
        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_process_is_killed_after_timeout() {
        let f = fixture_with(|e| e.ignores_sigterm = true, host());
        let id = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap()
            .capture_id
            .to_string();

        f.manager.stop_capture(&id).await.unwrap();
        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(f.tally.killed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_stop_still_completes_the_session() {
        let f = fixture_with(|e| e.ignores_sigterm = true, host());
        let started = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();
        let id = started.capture_id.to_string();

        // Caller gives up before the termination timeout expires
        let first =
            tokio::time::timeout(Duration::from_secs(1), f.manager.stop_capture(&id)).await;
        assert!(first.is_err());
        assert!(matches!(
            f.manager.stop_capture(&id).await,
            Err(CaptureError::Conflict(_))
        ));

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(f.tally.killed.load(Ordering::SeqCst), 1);
        assert!(!f.manager.store().is_active(&started.capture_id));
        assert!(f.manager.store().is_completed(&started.capture_id));
        assert_eq!(f.manager.list_captures()[0].state, SessionState::Stopped);

        assert!(matches!(
            f.manager.stop_capture(&id).await,
            Err(CaptureError::NotFound(_))
        ));
        let downloaded = f.manager.download_capture(&id, None).await.unwrap();
        assert!(downloaded.file_name.starts_with("capture_eth0_"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_artifact_is_reported_and_session_completed() {
        let f = fixture_with(|e| e.write_artifact = false, host());
        let started = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();

        let result = f
            .manager
            .stop_capture(&started.capture_id.to_string())
            .await;
        assert!(matches!(result, Err(CaptureError::ArtifactMissing(_))));
        assert!(!f.manager.store().is_active(&started.capture_id));
    }

    #[tokio::test]
    async fn engine_failure_registers_nothing() {
        let f = fixture_with(|e| e.fail_start = true, host());
        let result = f.manager.start_capture("eth0", &CaptureFilter::default());
        assert!(matches!(result, Err(CaptureError::EngineStart(_))));
        assert_eq!(f.manager.store().active_count(), 0);
        assert!(f.manager.list_captures().is_empty());
    }

    #[tokio::test]
    async fn invalid_interfaces_are_rejected() {
        let f = fixture();
        for bad in ["", "   ", "eth0/../x", "eth 0"] {
            let result = f.manager.start_capture(bad, &CaptureFilter::default());
            assert!(
                matches!(result, Err(CaptureError::Validation(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert_eq!(f.tally.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn identity_user_depends_on_container_detection() {
        let f = fixture();
        f.manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();
        let req = f.tally.requests.lock().unwrap()[0].clone();
        assert_eq!(req.identity_user.as_deref(), Some("tester"));
        assert_eq!(req.max_packets, 10_000);

        let containerized = fixture_with(
            |_| {},
            HostEnvironment {
                in_container: true,
                login_user: Some("tester".to_string()),
            },
        );
        containerized
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();
        let req = containerized.tally.requests.lock().unwrap()[0].clone();
        assert_eq!(req.identity_user, None);
    }

    #[tokio::test]
    async fn alias_shows_in_display_name() {
        let f = fixture();
        f.labels.set_alias("eth0", Some("uplink".to_string()));
        let started = f
            .manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();
        assert_eq!(started.display_name, "eth0 (uplink)");
        assert_eq!(f.manager.list_captures()[0].display_name, "eth0 (uplink)");
    }

    #[tokio::test]
    async fn many_starts_get_distinct_ids_and_paths() {
        let f = fixture_with(|e| e.write_artifact = false, host());
        let mut ids = HashSet::new();
        let mut files = HashSet::new();
        for _ in 0..1000 {
            let started = f
                .manager
                .start_capture("eth0", &CaptureFilter::default())
                .unwrap();
            ids.insert(started.capture_id);
        }
        for summary in f.manager.list_captures() {
            files.insert(summary.file);
        }
        assert_eq!(ids.len(), 1000);
        assert_eq!(files.len(), 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_starts_get_distinct_ids_and_paths() {
        let Fixture {
            _tmp,
            tally,
            manager,
            ..
        } = fixture_with(|e| e.write_artifact = false, host());
        let manager = Arc::new(manager);

        let tasks: Vec<_> = (0..1000)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let iface = format!("eth{}", i % 4);
                tokio::spawn(async move {
                    manager
                        .start_capture(&iface, &CaptureFilter::default())
                        .map(|started| started.capture_id)
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap());
        }
        let files: HashSet<_> = manager
            .list_captures()
            .into_iter()
            .map(|summary| summary.file)
            .collect();

        assert_eq!(ids.len(), 1000);
        assert_eq!(files.len(), 1000);
        assert_eq!(manager.store().active_count(), 1000);
        assert_eq!(tally.started.load(Ordering::SeqCst), 1000);
    }

    #[tokio::test]
    async fn start_recreates_a_removed_scratch_directory() {
        let f = fixture();
        std::fs::remove_dir_all(f.manager.scratch().path()).unwrap();
        f.manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();
        assert!(f.manager.scratch().path().is_dir());
    }

    #[tokio::test]
    async fn shutdown_signals_active_sessions_and_removes_directory() {
        let f = fixture();
        for iface in ["eth0", "eth1", "eth2"] {
            f.manager
                .start_capture(iface, &CaptureFilter::default())
                .unwrap();
        }

        f.manager.shutdown();
        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 3);
        assert_eq!(f.manager.store().active_count(), 0);
        assert!(!f.manager.scratch().path().exists());

        // Second call is a no-op
        f.manager.shutdown();
        assert_eq!(f.tally.terminated.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn drop_runs_shutdown() {
        let f = fixture();
        f.manager
            .start_capture("eth0", &CaptureFilter::default())
            .unwrap();
        let scratch = f.manager.scratch().path().to_path_buf();
        let tally = Arc::clone(&f.tally);
        let Fixture { _tmp, manager, .. } = f;
        drop(manager);
        assert_eq!(tally.terminated.load(Ordering::SeqCst), 1);
        assert!(!scratch.exists());
    }
}
