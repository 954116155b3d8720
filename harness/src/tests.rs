#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::future::{self, BoxFuture, FutureExt};
    use shared::{FaultKind, VoteChoice, VoteRecord, VoterId};
    use tokio::time::Instant;

    use crate::config::{HarnessConfig, MAX_WAIT_TIMEOUT_SECS};
    use crate::db::single_vote;
    use crate::error::{HarnessError, Result};
    use crate::queue::{check_depth, encode_vote, push_command};
    use shared::QueueEnd;
    use crate::scenarios::expect_vote;
    use crate::waiter::{expect_vote_updated, Convergence, PendingChange, VoteReader, WaitPolicy};

    fn choice(s: &str) -> VoteChoice {
        VoteChoice::new(s).unwrap()
    }

    fn voter(s: &str) -> VoterId {
        VoterId::new(s).unwrap()
    }

    fn record(id: &str, vote: &str) -> VoteRecord {
        VoteRecord { voter_id: voter(id), vote: choice(vote) }
    }

    /// Rows kept in memory, looked up the same way the store connector does.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<VoteRecord>>,
        reads: AtomicU32,
    }

    impl MemoryStore {
        fn with_rows(rows: Vec<VoteRecord>) -> Self {
            Self { rows: Mutex::new(rows), reads: AtomicU32::new(0) }
        }

        fn insert(&self, row: VoteRecord) {
            self.rows.lock().unwrap().push(row);
        }

        fn reads(&self) -> u32 {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl VoteReader for MemoryStore {
        fn fetch_vote<'a>(&'a self, voter_id: &'a VoterId) -> BoxFuture<'a, Result<Option<VoteChoice>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let matches = self.rows.lock().unwrap().iter()
                .filter(|r| &r.voter_id == voter_id)
                .map(|r| r.vote.clone())
                .collect();
            future::ready(single_vote(voter_id, matches)).boxed()
        }
    }

    /// Returns the scripted values in order, repeating the last one forever.
    struct ScriptedReader {
        values: Vec<Option<VoteChoice>>,
        reads: AtomicU32,
    }

    impl ScriptedReader {
        fn new(values: Vec<Option<VoteChoice>>) -> Self {
            Self { values, reads: AtomicU32::new(0) }
        }
    }

    impl VoteReader for ScriptedReader {
        fn fetch_vote<'a>(&'a self, _voter_id: &'a VoterId) -> BoxFuture<'a, Result<Option<VoteChoice>>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) as usize;
            let value = self.values.get(n).or(self.values.last()).cloned().flatten();
            future::ready(Ok(value)).boxed()
        }
    }

    #[tokio::test]
    async fn test_lookup_cardinality() {
        let store = MemoryStore::with_rows(vec![
            record("v1", "a"),
            record("dup", "a"),
            record("dup", "b"),
        ]);

        assert_eq!(store.fetch_vote(&voter("nobody")).await.unwrap(), None);
        assert_eq!(store.fetch_vote(&voter("v1")).await.unwrap(), Some(choice("a")));
        assert!(matches!(
            store.fetch_vote(&voter("dup")).await,
            Err(HarnessError::MultipleMatch { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_is_idempotent() {
        let store = MemoryStore::with_rows(vec![record("v1", "b")]);
        let id = voter("v1");

        let first = store.fetch_vote(&id).await.unwrap();
        for _ in 0..5 {
            assert_eq!(store.fetch_vote(&id).await.unwrap(), first);
        }
    }

    #[test]
    fn test_single_vote_never_picks_a_row() {
        let id = voter("v3");
        assert_eq!(single_vote(&id, vec![]).unwrap(), None);
        assert_eq!(single_vote(&id, vec![choice("a")]).unwrap(), Some(choice("a")));

        let err = single_vote(&id, vec![choice("a"), choice("a"), choice("b")]).unwrap_err();
        assert_eq!(err.kind(), FaultKind::Integrity);
        assert!(err.to_string().contains("Found 3 votes for voter v3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_returns_once_value_changes() {
        let reader = ScriptedReader::new(vec![None, None, None, Some(choice("a"))]);
        let policy = WaitPolicy::default();
        let start = Instant::now();

        let pending = PendingChange::observe(&reader, &voter("v2")).await.unwrap();
        assert_eq!(pending.previous(), None);

        let outcome = pending.settle(policy).await.unwrap();
        assert_eq!(outcome, Convergence::Changed { polls: 3, value: Some(choice("a")) });
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert!(start.elapsed() < policy.timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_gives_up_at_deadline() {
        let reader = ScriptedReader::new(vec![Some(choice("a"))]);
        let policy = WaitPolicy::default();
        let start = Instant::now();

        let pending = PendingChange::observe(&reader, &voter("v2")).await.unwrap();
        let outcome = pending.settle(policy).await.unwrap();

        assert_eq!(outcome, Convergence::TimedOut { polls: 61 });
        assert!(!outcome.is_changed());
        let elapsed = start.elapsed();
        assert!(elapsed >= policy.timeout);
        assert!(elapsed < policy.timeout + policy.poll_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_sleep_is_clamped_to_deadline() {
        let reader = ScriptedReader::new(vec![None]);
        let policy = WaitPolicy {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3),
        };
        let start = Instant::now();

        let pending = PendingChange::observe(&reader, &voter("v2")).await.unwrap();
        let outcome = pending.settle(policy).await.unwrap();

        // polls at 0s, 3s, 6s, 9s and a final one at 10s
        assert_eq!(outcome.polls(), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_polls_once() {
        let reader = ScriptedReader::new(vec![None]);
        let policy = WaitPolicy { timeout: Duration::ZERO, poll_interval: Duration::from_secs(1) };

        let pending = PendingChange::observe(&reader, &voter("v2")).await.unwrap();
        assert_eq!(pending.settle(policy).await.unwrap(), Convergence::TimedOut { polls: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_does_not_overflow() {
        let reader = ScriptedReader::new(vec![None, None, Some(choice("b"))]);
        let policy = WaitPolicy { timeout: Duration::MAX, poll_interval: Duration::from_secs(1) };

        let pending = PendingChange::observe(&reader, &voter("v2")).await.unwrap();
        let outcome = pending.settle(policy).await.unwrap();
        assert_eq!(outcome, Convergence::Changed { polls: 2, value: Some(choice("b")) });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_interval_is_clamped_to_deadline() {
        let reader = ScriptedReader::new(vec![None]);
        let policy = WaitPolicy { timeout: Duration::from_secs(5), poll_interval: Duration::MAX };
        let start = Instant::now();

        let pending = PendingChange::observe(&reader, &voter("v2")).await.unwrap();
        assert_eq!(pending.settle(policy).await.unwrap(), Convergence::TimedOut { polls: 2 });
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_taken_before_work() {
        let store = MemoryStore::default();
        let id = voter("v2");
        let start = Instant::now();

        let work = async {
            store.insert(record("v2", "a"));
            Ok::<_, HarnessError>("pushed")
        };
        let output = expect_vote_updated(&store, &id, WaitPolicy::default(), work).await.unwrap();

        assert_eq!(output, "pushed");
        assert_eq!(store.reads(), 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_work_skips_polling() {
        let store = MemoryStore::default();
        let start = Instant::now();

        let work = async { Err::<(), _>(HarnessError::QueueNotDrained { depth: 3 }) };
        let result = expect_vote_updated(&store, &voter("v2"), WaitPolicy::default(), work).await;

        assert!(matches!(result, Err(HarnessError::QueueNotDrained { depth: 3 })));
        assert_eq!(store.reads(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_integrity_fault_during_poll_propagates() {
        let store = MemoryStore::with_rows(vec![record("v2", "a")]);

        let work = async {
            store.insert(record("v2", "b"));
            Ok::<_, HarnessError>(())
        };
        let result = expect_vote_updated(&store, &voter("v2"), WaitPolicy::default(), work).await;

        assert!(matches!(result, Err(HarnessError::MultipleMatch { count: 2, .. })));
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_integrity_fault_before_work_skips_work() {
        let store = MemoryStore::with_rows(vec![record("v2", "a"), record("v2", "a")]);
        let ran = AtomicBool::new(false);

        let work = async {
            ran.store(true, Ordering::SeqCst);
            Ok::<_, HarnessError>(())
        };
        let result = expect_vote_updated(&store, &voter("v2"), WaitPolicy::default(), work).await;

        assert!(matches!(result, Err(HarnessError::MultipleMatch { .. })));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_expect_vote() {
        let store = MemoryStore::with_rows(vec![record("v1", "b")]);

        assert!(expect_vote(&store, &voter("v1"), &choice("b")).await.is_ok());

        match expect_vote(&store, &voter("v1"), &choice("a")).await {
            Err(HarnessError::UnexpectedVote { expected, found, .. }) => {
                assert_eq!(expected, choice("a"));
                assert_eq!(found, Some(choice("b")));
            }
            other => panic!("expected UnexpectedVote, got {other:?}"),
        }

        let err = expect_vote(&store, &voter("v9"), &choice("a")).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::Assertion);
    }

    #[test]
    fn test_config_defaults() {
        let config = HarnessConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.api.url(), "http://localhost:8080/");
        assert_eq!(config.queue.url(), "redis://localhost:8081/");
        assert_eq!(config.db.port, 8082);
        assert_eq!(config.db.table, "votes");
        assert_eq!(config.wait.timeout, Duration::from_secs(60));
        assert_eq!(config.wait.poll_interval, Duration::from_secs(1));
        assert!(config.queue.expect_drained);
    }

    #[test]
    fn test_config_overrides() {
        let config = HarnessConfig::from_lookup(|key| match key {
            "VOTE_API_HOST" => Some("vote.internal".into()),
            "VOTE_API_PORT" => Some(" 5000 ".into()),
            "VOTE_QUEUE_EXPECT_DRAINED" => Some("false".into()),
            "VOTE_DB_PASSWORD" => Some("secret".into()),
            "VOTE_DB_TABLE" => Some("votes_scratch".into()),
            "VOTE_WAIT_TIMEOUT_SECS" => Some("5".into()),
            "VOTE_POLL_INTERVAL_MS" => Some("250".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.api.url(), "http://vote.internal:5000/");
        assert!(!config.queue.expect_drained);
        assert_eq!(config.db.password.as_deref(), Some("secret"));
        assert_eq!(config.db.table, "votes_scratch");
        assert_eq!(config.wait.timeout, Duration::from_secs(5));
        assert_eq!(config.wait.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let bad = |bad_key: &'static str, value: &'static str| {
            HarnessConfig::from_lookup(move |key| (key == bad_key).then(|| value.to_string()))
        };

        for (key, value) in [
            ("VOTE_API_PORT", "http"),
            ("VOTE_REDIS_PORT", "70000"),
            ("VOTE_QUEUE_EXPECT_DRAINED", "maybe"),
            ("VOTE_DB_TABLE", "votes; --"),
            ("VOTE_POLL_INTERVAL_MS", "0"),
        ] {
            match bad(key, value) {
                Err(HarnessError::Config { key: reported, .. }) => assert_eq!(reported, key),
                other => panic!("{key}={value} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn test_config_rejects_oversized_timeout() {
        let max = MAX_WAIT_TIMEOUT_SECS.to_string();
        let config = HarnessConfig::from_lookup(|key| (key == "VOTE_WAIT_TIMEOUT_SECS").then(|| max.clone())).unwrap();
        assert_eq!(config.wait.timeout, Duration::from_secs(MAX_WAIT_TIMEOUT_SECS));

        for value in [(MAX_WAIT_TIMEOUT_SECS + 1).to_string(), u64::MAX.to_string()] {
            match HarnessConfig::from_lookup(|key| (key == "VOTE_WAIT_TIMEOUT_SECS").then(|| value.clone())) {
                Err(HarnessError::Config { key, .. }) => assert_eq!(key, "VOTE_WAIT_TIMEOUT_SECS"),
                other => panic!("timeout {value} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn test_push_command_picks_queue_end() {
        let payload = encode_vote(&choice("a"), &voter("v2")).unwrap();
        let packed = |verb: &str| {
            format!("*3\r\n$5\r\n{verb}\r\n$5\r\nvotes\r\n${}\r\n{payload}\r\n", payload.len()).into_bytes()
        };

        assert_eq!(push_command("votes", &payload, QueueEnd::Tail).get_packed_command(), packed("RPUSH"));
        assert_eq!(push_command("votes", &payload, QueueEnd::Head).get_packed_command(), packed("LPUSH"));
        assert_eq!(
            push_command("votes", &payload, QueueEnd::default()).get_packed_command(),
            packed("RPUSH")
        );
    }

    #[test]
    fn test_queue_payload_and_depth() {
        let payload = encode_vote(&choice("a"), &voter("v2")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value, serde_json::json!({ "vote": "a", "voter_id": "v2" }));

        assert!(check_depth(1, true).is_ok());
        assert!(check_depth(4, false).is_ok());
        let err = check_depth(2, true).unwrap_err();
        assert!(matches!(err, HarnessError::QueueNotDrained { depth: 2 }));
        assert_eq!(err.kind(), FaultKind::Queue);
    }
}
