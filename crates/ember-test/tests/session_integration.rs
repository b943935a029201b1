//! Integration tests for sessions over the in-memory `users` database.

use std::sync::Arc;
use std::time::Duration;

use ember_common::config::{ExecutorSettings, ExecutorType};
use ember_common::error::EmberError;
use ember_common::types::Value;
use ember_executor::{CollectingResultHandler, ConnectionTransactionFactory, RowBounds};
use ember_session::{
    with_session, with_session_options, SessionFactory, SessionOptions,
    TransactionIsolationLevel,
};
use ember_test::memory::{user, ConnectionLog, MemoryFixture, RecordingConnection};

fn fixture() -> MemoryFixture {
    MemoryFixture::new(ExecutorSettings::default()).unwrap()
}

fn name(row: &Value) -> String {
    row.as_object()
        .and_then(|u| u.get("name"))
        .and_then(|n| n.as_str().map(str::to_string))
        .unwrap()
}

fn id(row: &Value) -> i64 {
    row.as_object()
        .and_then(|u| u.get("id"))
        .and_then(|id| id.to_i64())
        .unwrap()
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_select_one() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session().unwrap();

    let found = session.select_one("selectUser", Some(&Value::from(1))).unwrap();
    assert_eq!(name(&found.unwrap()), "ada");

    let missing = session.select_one("selectUser", Some(&Value::from(2))).unwrap();
    assert!(missing.is_none());
    assert_eq!(session.statement_count(), 2);
}

#[test]
fn test_select_one_rejects_many_rows() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    fx.database.seed(2, "grace");
    let mut session = fx.factory.open_session().unwrap();

    let err = session.select_one("selectAllUsers", None).unwrap_err();
    assert!(matches!(
        err,
        EmberError::TooManyResults {
            expected: 1,
            actual: 2
        }
    ));
}

#[test]
fn test_repeated_select_served_from_cache() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session().unwrap();

    let first = session.select_list("selectUser", Some(&Value::from(1))).unwrap();
    let second = session.select_list("selectUser", Some(&Value::from(1))).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fx.database.reads(), 1);
}

#[test]
fn test_sessions_do_not_share_cache() {
    let fx = fixture();
    fx.database.seed(1, "ada");

    let mut a = fx.factory.open_session().unwrap();
    let mut b = fx.factory.open_session().unwrap();
    a.select_list("selectUser", Some(&Value::from(1))).unwrap();
    b.select_list("selectUser", Some(&Value::from(1))).unwrap();

    assert_ne!(a.id(), b.id());
    assert_eq!(fx.database.reads(), 2);
}

#[test]
fn test_write_invalidates_cache() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session().unwrap();
    let param = Value::from(1);

    let before = session.select_one("selectUser", Some(&param)).unwrap().unwrap();
    let rename = Value::object("User", [("id", Value::from(1)), ("name", Value::from("lovelace"))]);
    assert_eq!(session.update("renameUser", Some(&rename)).unwrap(), 1);
    let after = session.select_one("selectUser", Some(&param)).unwrap().unwrap();

    assert_eq!(name(&before), "ada");
    assert_eq!(name(&after), "lovelace");
    assert_eq!(fx.database.reads(), 2);
}

#[test]
fn test_select_with_bounds() {
    let fx = fixture();
    for (i, n) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        fx.database.seed(i as i64 + 1, n);
    }
    let mut session = fx.factory.open_session().unwrap();

    let page = session
        .select_list_with_bounds("selectAllUsers", None, RowBounds::new(1, 2))
        .unwrap();
    let ids: Vec<i64> = page.iter().map(id).collect();

    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_select_with_handler() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    fx.database.seed(2, "grace");
    let mut session = fx.factory.open_session().unwrap();

    let mut handler = CollectingResultHandler::new();
    session
        .select_with_handler("selectAllUsers", None, RowBounds::DEFAULT, &mut handler)
        .unwrap();

    assert_eq!(handler.rows().len(), 2);
}

#[test]
fn test_select_cursor() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    fx.database.seed(2, "grace");
    let mut session = fx.factory.open_session().unwrap();

    let mut cursor = session
        .select_cursor("selectAllUsers", None, RowBounds::DEFAULT)
        .unwrap();
    let names: Vec<String> = cursor
        .iter()
        .unwrap()
        .map(|row| name(&row.unwrap()))
        .collect();

    assert_eq!(names, vec!["ada", "grace"]);
    assert!(cursor.is_consumed());
}

#[test]
fn test_list_parameter_is_accepted() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session().unwrap();
    let ids = Value::List(vec![Value::from(1), Value::from(2)]);

    let rows = session.select_list("selectAllUsers", Some(&ids)).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_unknown_statement() {
    let fx = fixture();
    let mut session = fx.factory.open_session().unwrap();

    let err = session.select_list("selectNobody", None).unwrap_err();
    assert!(matches!(err, EmberError::Configuration { .. }));
    assert_eq!(fx.database.reads(), 0);
}

#[test]
fn test_failing_select_names_statement() {
    let fx = fixture();
    let mut session = fx.factory.open_session().unwrap();

    let err = session.select_list("failingSelect", None).unwrap_err();
    assert!(err.to_string().contains("failingSelect"), "{err}");

    // The failed key is not cached; a retry reaches the database again.
    session.select_list("failingSelect", None).unwrap_err();
    assert_eq!(fx.database.reads(), 2);
}

// =============================================================================
// Transactions
// =============================================================================

#[test]
fn test_connection_opened_lazily() {
    let fx = fixture();
    let session = fx.factory.open_session().unwrap();
    assert_eq!(fx.connections.opened(), 0);
    drop(session);
    assert_eq!(fx.connections.opened(), 0);
}

#[test]
fn test_commit_after_write() {
    let fx = fixture();
    let mut session = fx.factory.open_session().unwrap();

    session.insert("insertUser", Some(&user(1, "ada"))).unwrap();
    assert!(session.is_dirty());
    session.commit(false).unwrap();
    assert!(!session.is_dirty());
    session.close();

    assert_eq!(
        fx.connections.events(),
        vec![
            "open",
            "auto_commit=false",
            "execute:insertUser",
            "commit",
            "auto_commit=true",
            "close"
        ]
    );
    assert_eq!(fx.database.len(), 1);
}

#[test]
fn test_commit_without_writes_is_skipped() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session().unwrap();

    session.select_list("selectUser", Some(&Value::from(1))).unwrap();
    session.commit(false).unwrap();
    assert_eq!(fx.connections.count("commit"), 0);

    session.commit(true).unwrap();
    assert_eq!(fx.connections.count("commit"), 1);
}

#[test]
fn test_close_rolls_back_uncommitted_writes() {
    let fx = fixture();
    {
        let mut session = fx.factory.open_session().unwrap();
        session.delete("deleteUser", Some(&Value::from(9))).unwrap();
    }

    assert_eq!(fx.connections.count("rollback"), 1);
    assert_eq!(fx.connections.count("close"), 1);
}

#[test]
fn test_auto_commit_session_never_commits() {
    let fx = fixture();
    let mut session = fx
        .factory
        .open_session_with(SessionOptions::new().auto_commit(true))
        .unwrap();

    session.insert("insertUser", Some(&user(1, "ada"))).unwrap();
    session.commit(false).unwrap();
    session.close();

    assert_eq!(fx.connections.count("commit"), 0);
    assert_eq!(fx.connections.count("rollback"), 0);
    assert_eq!(fx.connections.count("auto_commit=false"), 0);
}

#[test]
fn test_isolation_level_applied() {
    let fx = fixture();
    let mut session = fx
        .factory
        .open_session_with(
            SessionOptions::new().isolation_level(TransactionIsolationLevel::Serializable),
        )
        .unwrap();

    session.select_list("selectAllUsers", None).unwrap();

    assert_eq!(fx.connections.count("isolation=SERIALIZABLE"), 1);
}

#[test]
fn test_session_on_supplied_connection() {
    let fx = fixture();
    let log = Arc::new(ConnectionLog::default());
    let connection = Box::new(RecordingConnection::new(Arc::clone(&log)));
    let mut session = fx.factory.open_session_on(connection, None).unwrap();

    session.insert("insertUser", Some(&user(1, "ada"))).unwrap();
    session.commit(false).unwrap();
    session.close();

    assert_eq!(log.events(), vec!["execute:insertUser", "close"]);
    assert_eq!(fx.connections.opened(), 0);
}

// =============================================================================
// Batching
// =============================================================================

fn batch() -> SessionOptions {
    SessionOptions::new().executor_type(ExecutorType::Batch)
}

#[test]
fn test_batch_buffers_until_flush() {
    let fx = fixture();
    let mut session = fx.factory.open_session_with(batch()).unwrap();

    assert_eq!(session.insert("insertUser", Some(&user(1, "ada"))).unwrap(), 0);
    assert_eq!(session.insert("insertUser", Some(&user(2, "grace"))).unwrap(), 0);
    assert!(fx.database.is_empty());

    let results = session.flush_statements().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].statement_id(), "insertUser");
    assert_eq!(results[0].update_counts(), &[1, 1]);
    assert_eq!(results[0].parameter_objects().len(), 2);
    assert_eq!(fx.database.len(), 2);
}

#[test]
fn test_batch_commit_flushes() {
    let fx = fixture();
    let mut session = fx.factory.open_session_with(batch()).unwrap();

    session.insert("insertUser", Some(&user(1, "ada"))).unwrap();
    session.commit(false).unwrap();

    assert_eq!(fx.database.name_of(1).as_deref(), Some("ada"));
    assert_eq!(fx.connections.count("commit"), 1);
}

#[test]
fn test_batch_rollback_discards() {
    let fx = fixture();
    let mut session = fx.factory.open_session_with(batch()).unwrap();

    session.insert("insertUser", Some(&user(1, "ada"))).unwrap();
    session.rollback(false).unwrap();
    session.commit(true).unwrap();

    assert!(fx.database.is_empty());
}

#[test]
fn test_batch_groups_consecutive_statements() {
    let fx = fixture();
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session_with(batch()).unwrap();
    let rename = Value::object("User", [("id", Value::from(1)), ("name", Value::from("lovelace"))]);

    session.insert("insertUser", Some(&user(2, "grace"))).unwrap();
    session.update("renameUser", Some(&rename)).unwrap();
    session.insert("insertUser", Some(&user(3, "hopper"))).unwrap();
    let results = session.flush_statements().unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.statement_id()).collect();
    assert_eq!(ids, vec!["insertUser", "renameUser", "insertUser"]);
    assert_eq!(fx.database.name_of(1).as_deref(), Some("lovelace"));
}

// =============================================================================
// Timeouts
// =============================================================================

fn fixture_with_timeouts(default_secs: u64, transaction: Duration) -> MemoryFixture {
    let settings = ExecutorSettings::builder()
        .default_statement_timeout_secs(default_secs)
        .build();
    let mut fx = MemoryFixture::new(settings).unwrap();
    fx.factory = fx.factory.with_transaction_factory(Arc::new(
        ConnectionTransactionFactory::new().with_timeout(transaction),
    ));
    fx
}

#[test]
fn test_queries_run_with_default_timeout() {
    let settings = ExecutorSettings::builder()
        .default_statement_timeout_secs(30)
        .build();
    let fx = MemoryFixture::new(settings).unwrap();
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session().unwrap();

    session.select_one("selectUser", Some(&Value::from(1))).unwrap();
    session.insert("insertUser", Some(&user(2, "grace"))).unwrap();

    assert_eq!(
        fx.connections.timeouts(),
        vec![Some(Duration::from_secs(30)), Some(Duration::from_secs(30))]
    );
}

#[test]
fn test_transaction_timeout_caps_statement_timeout() {
    let fx = fixture_with_timeouts(30, Duration::from_secs(5));
    fx.database.seed(1, "ada");
    let mut session = fx.factory.open_session().unwrap();

    session.select_one("selectUser", Some(&Value::from(1))).unwrap();

    assert_eq!(fx.connections.timeouts(), vec![Some(Duration::from_secs(5))]);
}

#[test]
fn test_batched_writes_keep_their_timeout() {
    let fx = fixture_with_timeouts(3, Duration::from_secs(10));
    let mut session = fx.factory.open_session_with(batch()).unwrap();

    session.insert("insertUser", Some(&user(1, "ada"))).unwrap();
    assert!(fx.connections.timeouts().is_empty());
    session.flush_statements().unwrap();

    assert_eq!(fx.connections.timeouts(), vec![Some(Duration::from_secs(3))]);
}

// =============================================================================
// Scoped units of work
// =============================================================================

#[test]
fn test_with_session_commits_on_success() {
    let fx = fixture();

    let inserted = with_session(&fx.factory, |session| {
        session.insert("insertUser", Some(&user(1, "ada")))
    })
    .unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(fx.connections.count("commit"), 1);
    assert_eq!(fx.connections.count("rollback"), 0);
    assert_eq!(fx.connections.count("close"), 1);
}

#[test]
fn test_with_session_rolls_back_on_failure() {
    let fx = fixture();

    let err = with_session(&fx.factory, |session| {
        session.insert("insertUser", Some(&user(1, "ada")))?;
        session.insert("insertUser", Some(&user(1, "ada")))
    })
    .unwrap_err();

    assert!(err.to_string().contains("duplicate key"), "{err}");
    assert_eq!(fx.connections.count("commit"), 0);
    assert_eq!(fx.connections.count("rollback"), 1);
    assert_eq!(fx.connections.count("close"), 1);
}

#[test]
fn test_with_session_options_batch() {
    let fx = fixture();

    with_session_options(&fx.factory, batch(), |session| {
        session.insert("insertUser", Some(&user(1, "ada")))?;
        session.insert("insertUser", Some(&user(2, "grace")))
    })
    .unwrap();

    assert_eq!(fx.database.len(), 2);
}
