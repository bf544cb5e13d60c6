use rulestore_core::{
    AdapterError, AdapterResult, BlockingExecutor, Context, ContextAdapter, ContextError,
    Executor, MemoryModel, PolicyModel, RuleFilter, RuleValidationError, SqliteRuleRepository,
};
use rusqlite::Connection;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SLOW_OP_DELAY: Duration = Duration::from_millis(100);
const SHORT_TIMEOUT: Duration = Duration::from_millis(10);

/// Delays every operation before it touches the store.
struct SlowExecutor {
    inner: BlockingExecutor,
    delay: Duration,
}

impl SlowExecutor {
    fn new(delay: Duration) -> Self {
        Self {
            inner: BlockingExecutor::new(),
            delay,
        }
    }
}

impl Executor for SlowExecutor {
    fn execute<'a, T, F>(
        &'a self,
        ctx: &'a Context,
        op: F,
    ) -> impl Future<Output = AdapterResult<T>> + Send + 'a
    where
        T: Send + 'static,
        F: FnOnce() -> AdapterResult<T> + Send + 'static,
    {
        let delay = self.delay;
        self.inner.execute(ctx, move || {
            std::thread::sleep(delay);
            op()
        })
    }

    fn drain(&self) -> impl Future<Output = ()> + Send + '_ {
        self.inner.drain()
    }
}

struct Fixture {
    _dir: TempDir,
    path: PathBuf,
    adapter: ContextAdapter,
}

impl Fixture {
    /// Adapter over the same store whose operations outlast `SHORT_TIMEOUT`.
    fn slow_adapter(&self) -> ContextAdapter<SqliteRuleRepository, SlowExecutor> {
        ContextAdapter::with_parts(
            Arc::clone(self.adapter.repository()),
            SlowExecutor::new(SLOW_OP_DELAY),
        )
    }

    fn insert_row_directly(&self, ptype: &str, fields: &[&str]) {
        let conn = Connection::open(&self.path).unwrap();
        let mut values = [""; 6];
        values[..fields.len()].copy_from_slice(fields);
        conn.execute(
            "INSERT INTO casbin_rule (ptype, v0, v1, v2, v3, v4, v5)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            rusqlite::params![
                ptype, values[0], values[1], values[2], values[3], values[4], values[5]
            ],
        )
        .unwrap();
    }

    async fn stored_rules(&self) -> Vec<Vec<String>> {
        let mut model = MemoryModel::new();
        self.adapter.load_policy(&mut model).await.unwrap();
        model.rules("p", "p").to_vec()
    }
}

/// Opens a file-backed adapter and empties its policy table.
async fn clear_db_policy() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.db");
    let adapter = ContextAdapter::new("sqlite", path.to_str().unwrap()).unwrap();
    adapter.save_policy(&MemoryModel::new()).await.unwrap();
    Fixture {
        _dir: dir,
        path,
        adapter,
    }
}

fn rule(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

fn timeout_ctx() -> Context {
    Context::background().with_timeout(SHORT_TIMEOUT)
}

fn assert_deadline_exceeded(result: AdapterResult<()>) {
    let err = result.unwrap_err();
    assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));
    assert_eq!(err.to_string(), "context deadline exceeded");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn load_policy_ctx_reads_rows_inserted_outside_the_adapter() {
    let fixture = clear_db_policy().await;
    fixture.insert_row_directly("p", &["alice", "data1", "read"]);

    let mut model = MemoryModel::new();
    fixture
        .adapter
        .load_policy_ctx(&Context::background(), &mut model)
        .await
        .unwrap();
    assert_eq!(model.rules("p", "p"), &[rule(&["alice", "data1", "read"])]);
    assert_eq!(model.len(), 1);

    let slow = fixture.slow_adapter();
    let mut untouched = MemoryModel::new();
    assert_deadline_exceeded(slow.load_policy_ctx(&timeout_ctx(), &mut untouched).await);
    assert!(untouched.is_empty());
    slow.drain().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_policy_ctx_replaces_stored_rules() {
    let fixture = clear_db_policy().await;
    fixture.insert_row_directly("p", &["bob", "data2", "write"]);

    let mut model = MemoryModel::new();
    model.add_rule("p", "p", rule(&["alice", "data1", "read"]));
    model.add_rule("g", "g", rule(&["alice", "admin"]));
    fixture
        .adapter
        .save_policy_ctx(&Context::background(), &model)
        .await
        .unwrap();

    let mut reloaded = MemoryModel::new();
    fixture.adapter.load_policy(&mut reloaded).await.unwrap();
    assert_eq!(reloaded, model);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_save_still_replaces_rules_in_background() {
    let fixture = clear_db_policy().await;
    fixture.insert_row_directly("p", &["old", "x", "y"]);

    let mut model = MemoryModel::new();
    model.add_rule("p", "p", rule(&["new", "a", "b"]));
    let slow = fixture.slow_adapter();
    assert_deadline_exceeded(slow.save_policy_ctx(&timeout_ctx(), &model).await);
    slow.drain().await;

    assert_eq!(fixture.stored_rules().await, vec![rule(&["new", "a", "b"])]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_policy_ctx_is_idempotent() {
    let fixture = clear_db_policy().await;
    let ctx = Context::background();

    fixture
        .adapter
        .add_policy_ctx(&ctx, "p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    fixture
        .adapter
        .add_policy_ctx(&ctx, "p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    assert_eq!(
        fixture.stored_rules().await,
        vec![rule(&["alice", "data1", "read"])]
    );

    let slow = fixture.slow_adapter();
    assert_deadline_exceeded(
        slow.add_policy_ctx(&timeout_ctx(), "p", "p", &["alice", "data1", "read"])
            .await,
    );
    slow.drain().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_add_still_commits_in_background() {
    let fixture = clear_db_policy().await;
    let slow = fixture.slow_adapter();

    assert_deadline_exceeded(
        slow.add_policy_ctx(&timeout_ctx(), "p", "p", &["carol", "data3", "read"])
            .await,
    );
    slow.drain().await;

    assert_eq!(
        fixture.stored_rules().await,
        vec![rule(&["carol", "data3", "read"])]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_policy_ctx_deletes_exact_rule_only() {
    let fixture = clear_db_policy().await;
    let adapter = &fixture.adapter;
    adapter
        .add_policy("p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    adapter
        .add_policy("p", "p", &["alice", "data2", "read"])
        .await
        .unwrap();

    adapter
        .remove_policy_ctx(&Context::background(), "p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    adapter
        .remove_policy("p", "p", &["nobody", "data9", "read"])
        .await
        .unwrap();
    adapter
        .remove_policy("p", "p", &["alice", "data2"])
        .await
        .unwrap();
    assert_eq!(
        fixture.stored_rules().await,
        vec![rule(&["alice", "data2", "read"])]
    );

    let slow = fixture.slow_adapter();
    assert_deadline_exceeded(
        slow.remove_policy_ctx(&timeout_ctx(), "p", "p", &["alice", "data1", "read"])
            .await,
    );
    slow.drain().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_filtered_policy_ctx_anchors_at_field_index() {
    let fixture = clear_db_policy().await;
    let adapter = &fixture.adapter;
    adapter
        .add_policy("p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    adapter
        .add_policy("p", "p", &["alice", "data1", "write"])
        .await
        .unwrap();
    adapter
        .add_policy("p", "p", &["alice", "data2", "read"])
        .await
        .unwrap();

    adapter
        .remove_filtered_policy_ctx(&Context::background(), "p", "p", 1, &["data1"])
        .await
        .unwrap();
    assert_eq!(
        fixture.stored_rules().await,
        vec![rule(&["alice", "data2", "read"])]
    );

    adapter
        .remove_filtered_policy("p", "p", 0, &["", "", "write"])
        .await
        .unwrap();
    assert_eq!(fixture.stored_rules().await.len(), 1);

    let slow = fixture.slow_adapter();
    assert_deadline_exceeded(
        slow.remove_filtered_policy_ctx(&timeout_ctx(), "p", "p", 1, &["data1"])
            .await,
    );
    slow.drain().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_filtered_policy_with_empty_values_matches_the_whole_ptype() {
    let fixture = clear_db_policy().await;
    let adapter = &fixture.adapter;
    adapter
        .add_policy("p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    adapter.add_policy("g", "g", &["alice", "admin"]).await.unwrap();

    adapter
        .remove_filtered_policy("p", "p", 0, &[""])
        .await
        .unwrap();

    let mut model = MemoryModel::new();
    adapter.load_policy(&mut model).await.unwrap();
    assert!(model.rules("p", "p").is_empty());
    assert_eq!(model.rules("g", "g"), &[rule(&["alice", "admin"])]);
}

#[tokio::test]
async fn fired_context_never_yields_store_errors() {
    let fixture = clear_db_policy().await;
    let adapter = &fixture.adapter;
    let (canceled, cancel) = Context::background().with_cancel();
    cancel.cancel();
    let expired = Context::background().with_timeout(Duration::ZERO);

    let mut model = MemoryModel::new();
    let mut results = Vec::new();
    results.push(adapter.load_policy_ctx(&canceled, &mut model).await);
    results.push(adapter.save_policy_ctx(&canceled, &model).await);
    results.push(adapter.add_policy_ctx(&canceled, "p", "p", &["alice"]).await);
    results.push(adapter.remove_policy_ctx(&canceled, "p", "p", &["alice"]).await);
    results.push(
        adapter
            .remove_filtered_policy_ctx(&canceled, "p", "p", 0, &["alice"])
            .await,
    );
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.context_error(), Some(ContextError::Canceled));
        assert_eq!(err.to_string(), "context canceled");
    }

    let err = adapter
        .add_policy_ctx(&expired, "p", "p", &["alice"])
        .await
        .unwrap_err();
    assert!(!err.is_store());
    assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));
    assert!(fixture.stored_rules().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_add_remove_and_update() {
    let fixture = clear_db_policy().await;
    let adapter = &fixture.adapter;

    adapter
        .add_policies(
            "p",
            "p",
            &[
                vec!["alice", "data1", "read"],
                vec!["bob", "data2", "write"],
                vec!["alice", "data1", "read"],
            ],
        )
        .await
        .unwrap();
    assert_eq!(fixture.stored_rules().await.len(), 2);

    adapter
        .update_policy(
            "p",
            "p",
            &["bob", "data2", "write"],
            &["bob", "data2", "read"],
        )
        .await
        .unwrap();
    assert_eq!(
        fixture.stored_rules().await,
        vec![rule(&["alice", "data1", "read"]), rule(&["bob", "data2", "read"])]
    );

    adapter
        .remove_policies(
            "p",
            "p",
            &[vec!["alice", "data1", "read"], vec!["bob", "data2", "read"]],
        )
        .await
        .unwrap();
    assert!(fixture.stored_rules().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filtered_load_blocks_whole_table_save() {
    let fixture = clear_db_policy().await;
    let adapter = &fixture.adapter;
    adapter
        .add_policy("p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    adapter
        .add_policy("p", "p", &["bob", "data2", "write"])
        .await
        .unwrap();
    adapter.add_policy("g", "g", &["alice", "admin"]).await.unwrap();

    let filter = RuleFilter::new().with_ptypes(["p"]).with_field(0, ["bob"]);
    let mut model = MemoryModel::new();
    adapter
        .load_filtered_policy(&mut model, &filter)
        .await
        .unwrap();
    assert!(adapter.is_filtered());
    assert_eq!(
        model.policy_rules("p"),
        vec![("p".to_string(), rule(&["bob", "data2", "write"]))]
    );
    assert!(model.policy_rules("g").is_empty());

    let err = adapter.save_policy(&model).await.unwrap_err();
    assert!(matches!(
        err,
        AdapterError::Validation(RuleValidationError::FilteredSave)
    ));

    let mut full = MemoryModel::new();
    adapter.load_policy(&mut full).await.unwrap();
    assert!(!adapter.is_filtered());
    assert_eq!(full.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_all_land() {
    let fixture = clear_db_policy().await;
    let adapter = Arc::new(ContextAdapter::with_parts(
        Arc::clone(fixture.adapter.repository()),
        BlockingExecutor::new(),
    ));

    let mut handles = Vec::new();
    for index in 0..8 {
        let adapter = Arc::clone(&adapter);
        handles.push(tokio::spawn(async move {
            let subject = format!("user{index}");
            let tokens = vec![subject, "data1".to_string(), "read".to_string()];
            adapter.add_policy("p", "p", &tokens).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(fixture.stored_rules().await.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timeout_of_one_call_leaves_a_concurrent_call_unaffected() {
    let fixture = clear_db_policy().await;
    let slow = fixture.slow_adapter();
    let fast = ContextAdapter::with_parts(
        Arc::clone(fixture.adapter.repository()),
        BlockingExecutor::new(),
    );

    let slow_ctx = timeout_ctx();
    let fast_ctx = Context::background();
    let (slow_result, fast_result) = tokio::join!(
        slow.add_policy_ctx(&slow_ctx, "p", "p", &["alice", "data1", "read"]),
        fast.add_policy_ctx(&fast_ctx, "p", "p", &["bob", "data2", "write"]),
    );
    assert_deadline_exceeded(slow_result);
    fast_result.unwrap();

    slow.drain().await;
    fast.drain().await;
    let mut stored = fixture.stored_rules().await;
    stored.sort();
    assert_eq!(
        stored,
        vec![rule(&["alice", "data1", "read"]), rule(&["bob", "data2", "write"])]
    );
}

#[tokio::test]
async fn custom_table_name_is_used_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tenant.db");
    let dsn = path.to_str().unwrap();

    let adapter = ContextAdapter::with_table_name("sqlite", dsn, "rules", "tenant1_").unwrap();
    adapter
        .add_policy("p", "p", &["alice", "data1", "read"])
        .await
        .unwrap();
    assert_eq!(adapter.repository().table().as_str(), "tenant1_rules");

    let conn = Connection::open(&path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tenant1_rules;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    let err = ContextAdapter::with_table_name("sqlite", dsn, "rules--", "")
        .err()
        .unwrap();
    assert!(err.is_validation());
}
