mod common;

use common::MockConnection;
use sqlmapper_cache::CacheConfig;
use sqlmapper_core::error::{CacheErrorKind, ExecutorErrorKind};
use sqlmapper_core::{Error, Object, RustType, Value};
use sqlmapper_dynamic::{ForeachNode, SqlNode, SqlSource};
use sqlmapper_executor::{
    BaseExecutor, CachingExecutor, Configuration, Executor, ExecutorType, KeyGenerator, LocalCacheScope,
    MappedStatement, ResultContext, ResultMap, ResultMapping, RowBounds, RowCount, Settings, SqlCommandType,
    StatementType,
};
use std::sync::Arc;

const FIND_USER: &str = "SELECT id, name FROM users WHERE id = ?";
const INSERT_USER: &str = "INSERT INTO users (name) VALUES (?)";
const RENAME_USER: &str = "UPDATE users SET name = ? WHERE id = ?";

fn sql(text: &str) -> SqlSource {
    SqlSource::from_sql(text).unwrap()
}

fn configuration(settings: Settings) -> Arc<Configuration> {
    Configuration::builder()
        .settings(settings)
        .cache("users", CacheConfig::new())
        .statement(
            MappedStatement::builder(
                "users.find",
                SqlCommandType::Select,
                sql("SELECT id, name FROM users WHERE id = #{id}"),
            )
            .result_type(RustType::Object)
            .cache("users"),
        )
        .statement(
            MappedStatement::builder(
                "users.findFresh",
                SqlCommandType::Select,
                sql("SELECT id, name FROM users WHERE id = #{id}"),
            )
            .result_type(RustType::Object)
            .flush_cache(true),
        )
        .statement(
            MappedStatement::builder(
                "users.insert",
                SqlCommandType::Insert,
                sql("INSERT INTO users (name) VALUES (#{name})"),
            )
            .key_generator(KeyGenerator::generated("id"))
            .cache("users"),
        )
        .statement(
            MappedStatement::builder(
                "users.rename",
                SqlCommandType::Update,
                sql("UPDATE users SET name = #{name} WHERE id = #{id}"),
            ),
        )
        .statement(
            MappedStatement::builder(
                "users.audit",
                SqlCommandType::Insert,
                sql("INSERT INTO audit (what) VALUES (#{name})"),
            ),
        )
        .statement(
            MappedStatement::builder(
                "users.procedure",
                SqlCommandType::Select,
                sql("CALL lookup(#{id}, #{total,mode=OUT,jdbcType=INTEGER})"),
            )
            .statement_type(StatementType::Callable)
            .result_type(RustType::Object)
            .cache("users"),
        )
        .build()
        .unwrap()
}

fn user(id: i64) -> Object {
    [("id", id)].into_iter().collect()
}

fn named(name: &str) -> Object {
    [("name", name)].into_iter().collect()
}

#[test]
fn repeated_query_is_served_from_local_cache() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    let first = executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    let second = executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(state.borrow().round_trips(), 1);
    assert_eq!(first[0].path("name"), Some(&Object::from("user-1")));

    executor.query(&find, &user(2), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().round_trips(), 2);
    assert_eq!(state.borrow().open_statements(), 0);
}

#[test]
fn commit_and_rollback_clear_local_cache() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    executor.commit(true).unwrap();
    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().round_trips(), 2);

    executor.rollback(true).unwrap();
    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().round_trips(), 3);
    assert_eq!(state.borrow().commits, 1);
    assert_eq!(state.borrow().rollbacks, 1);

    executor.commit(false).unwrap();
    assert_eq!(state.borrow().commits, 1);
}

#[test]
fn updates_and_flushing_selects_clear_local_cache() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();
    let fresh = config.mapped_statement("users.findFresh").unwrap();
    let rename = config.mapped_statement("users.rename").unwrap();

    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    let mut param: Object = [("id", Object::from(1i64)), ("name", Object::from("x"))].into_iter().collect();
    assert_eq!(executor.update(&rename, &mut param).unwrap(), RowCount::Affected(1));
    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().round_trips(), 2);

    executor.query(&fresh, &user(1), RowBounds::DEFAULT).unwrap();
    executor.query(&fresh, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().round_trips(), 4);
    assert_eq!(state.borrow().updates[0], (RENAME_USER.to_string(), vec![Value::Text("x".into()), Value::BigInt(1)]));
}

#[test]
fn statement_scope_does_not_keep_results() {
    let config = configuration(Settings::new().local_cache_scope(LocalCacheScope::Statement));
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().round_trips(), 2);
    assert_eq!(executor.local_cache_size(), 0);
}

#[test]
fn batched_updates_group_by_sql_and_statement() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::batch(Arc::clone(&config), conn);
    let insert = config.mapped_statement("users.insert").unwrap();
    let audit = config.mapped_statement("users.audit").unwrap();

    for name in ["a", "b", "c"] {
        assert_eq!(executor.update(&insert, &mut named(name)).unwrap(), RowCount::Deferred);
    }
    assert!(state.borrow().updates.is_empty());

    let results = executor.flush_statements(false).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].statement_id(), "users.insert");
    assert_eq!(results[0].sql(), INSERT_USER);
    assert_eq!(results[0].parameters().len(), 3);
    assert_eq!(results[0].update_counts(), &[1, 1, 1]);
    assert_eq!(results[0].parameters()[2].path("id"), Some(&Object::from(3i64)));
    assert_eq!(state.borrow().prepared.len(), 1);

    executor.update(&insert, &mut named("d")).unwrap();
    executor.update(&audit, &mut named("d")).unwrap();
    executor.update(&insert, &mut named("e")).unwrap();
    let results = executor.flush_statements(false).unwrap();
    let ids: Vec<_> = results.iter().map(|r| r.statement_id()).collect();
    assert_eq!(ids, vec!["users.insert", "users.audit", "users.insert"]);
    assert_eq!(state.borrow().open_statements(), 0);
}

#[test]
fn batch_failure_reports_position_and_prior_successes() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    conn.fail_on("INSERT INTO audit (what) VALUES (?)");
    let state = conn.state();
    let mut executor = BaseExecutor::batch(Arc::clone(&config), conn);
    let insert = config.mapped_statement("users.insert").unwrap();
    let audit = config.mapped_statement("users.audit").unwrap();
    let rename = config.mapped_statement("users.rename").unwrap();

    executor.update(&insert, &mut named("a")).unwrap();
    executor.update(&audit, &mut named("a")).unwrap();
    let mut param: Object = [("id", Object::from(1i64)), ("name", Object::from("b"))].into_iter().collect();
    executor.update(&rename, &mut param).unwrap();

    match executor.flush_statements(false) {
        Err(Error::Batch(err)) => {
            assert_eq!(err.index, 2);
            assert_eq!(err.item, 0);
            assert_eq!(err.statement_id, "users.audit");
            assert_eq!(err.succeeded.len(), 1);
            assert_eq!(err.succeeded[0].update_counts(), &[1]);
            assert_eq!(err.failed.parameters().len(), 1);
            assert!(err.failed.update_counts().is_empty());
        }
        other => panic!("expected batch error, got {other:?}"),
    }
    let state = state.borrow();
    assert_eq!(state.batches, vec![(INSERT_USER.to_string(), 1)]);
    assert_eq!(state.open_statements(), 0);
}

#[test]
fn batch_query_flushes_pending_updates_first() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::batch(Arc::clone(&config), conn);
    let insert = config.mapped_statement("users.insert").unwrap();
    let find = config.mapped_statement("users.find").unwrap();

    executor.update(&insert, &mut named("a")).unwrap();
    executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().batches.len(), 1);
    assert!(executor.flush_statements(false).unwrap().is_empty());
}

#[test]
fn rollback_discards_queued_batches() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::batch(Arc::clone(&config), conn);
    let insert = config.mapped_statement("users.insert").unwrap();

    executor.update(&insert, &mut named("a")).unwrap();
    executor.rollback(true).unwrap();
    executor.commit(true).unwrap();
    let state = state.borrow();
    assert!(state.batches.is_empty());
    assert_eq!(state.open_statements(), 0);
}

#[test]
fn reuse_prepares_each_sql_once() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::new(Arc::clone(&config), conn, ExecutorType::Reuse);
    let find = config.mapped_statement("users.find").unwrap();
    let rename = config.mapped_statement("users.rename").unwrap();

    for id in 1..=3 {
        executor.query(&find, &user(id), RowBounds::DEFAULT).unwrap();
        let mut param: Object = [("id", Object::from(id)), ("name", Object::from("n"))].into_iter().collect();
        executor.update(&rename, &mut param).unwrap();
    }
    assert_eq!(state.borrow().prepared, vec![FIND_USER.to_string(), RENAME_USER.to_string()]);
    assert_eq!(state.borrow().round_trips(), 3);
    assert_eq!(state.borrow().open_statements(), 2);

    executor.commit(true).unwrap();
    assert_eq!(state.borrow().open_statements(), 0);
}

#[test]
fn generated_keys_are_written_back() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let insert = config.mapped_statement("users.insert").unwrap();

    let mut param = named("ada");
    executor.update(&insert, &mut param).unwrap();
    assert_eq!(param.path("id"), Some(&Object::from(1i64)));
    assert_eq!(executor.last_generated_keys(), &[Value::BigInt(1)]);
}

#[test]
fn unresolved_parameter_fails_before_the_driver() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    let err = executor.query(&find, &named("x"), RowBounds::DEFAULT).unwrap_err();
    assert!(err.is_binding());
    assert!(state.borrow().prepared.is_empty());
}

#[test]
fn driver_errors_carry_statement_context() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    conn.fail_on(FIND_USER);
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    let err = executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap_err();
    assert_eq!(err.statement_id(), Some("users.find"));
    assert_eq!(err.sql(), Some(FIND_USER));
    assert_eq!(executor.local_cache_size(), 0);
}

#[test]
fn closed_executor_rejects_work() {
    let config = configuration(Settings::new());
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    executor.close(true).unwrap();
    assert!(executor.is_closed());
    assert!(state.borrow().connection_closed);
    assert_eq!(state.borrow().rollbacks, 1);
    assert!(matches!(
        executor.query(&find, &user(1), RowBounds::DEFAULT),
        Err(Error::Executor(_))
    ));
    assert!(executor.commit(true).is_err());
    assert!(executor.rollback(true).is_ok());
    assert!(executor.close(false).is_ok());
}

#[test]
fn row_bounds_are_part_of_the_key() {
    let config = configuration(Settings::new());
    let conn = MockConnection::new(|_, _| {
        let rows = (1..=5).map(|i| vec![Value::BigInt(i), Value::Text(format!("u{i}"))]).collect();
        (vec!["id".into(), "name".into()], rows)
    });
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    let page = executor.query(&find, &user(1), RowBounds::new(1, 2)).unwrap();
    let ids: Vec<_> = page.iter().filter_map(|o| o.path_value("id")).collect();
    assert_eq!(ids, vec![Value::BigInt(2), Value::BigInt(3)]);

    let all = executor.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(state.borrow().round_trips(), 2);
}

#[test]
fn handler_queries_stream_and_stop() {
    let config = configuration(Settings::new());
    let conn = MockConnection::new(|_, _| {
        let rows = (1..=5).map(|i| vec![Value::BigInt(i), Value::Null]).collect();
        (vec!["id".into(), "name".into()], rows)
    });
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    let mut seen = Vec::new();
    let mut handler = |ctx: &mut ResultContext| {
        seen.push(ctx.take_object());
        if ctx.result_count() == 2 {
            ctx.stop();
        }
    };
    executor
        .query_with_handler(&find, &user(1), RowBounds::DEFAULT, &mut handler)
        .unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(state.borrow().rows_fetched, 2);
    assert_eq!(executor.local_cache_size(), 0);
}

#[test]
fn cursor_streams_lazily_and_closes() {
    let config = configuration(Settings::new());
    let conn = MockConnection::new(|_, _| {
        let rows = (1..=3).map(|i| vec![Value::BigInt(i), Value::Text(format!("u{i}"))]).collect();
        (vec!["id".into(), "name".into()], rows)
    });
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.find").unwrap();

    let mut cursor = executor.query_cursor(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state.borrow().rows_fetched, 0);
    let first = cursor.next().unwrap().unwrap();
    assert_eq!(first.path("id"), Some(&Object::from(1i64)));
    assert_eq!(state.borrow().rows_fetched, 1);
    assert!(!cursor.is_closed());

    let rest: Vec<_> = cursor.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(rest.len(), 2);
    assert!(cursor.is_closed());
    assert_eq!(state.borrow().open_statements(), 0);

    let mut cursor = executor.query_cursor(&find, &user(1), RowBounds::DEFAULT).unwrap();
    cursor.next();
    assert_eq!(state.borrow().open_statements(), 1);
    drop(cursor);
    assert_eq!(state.borrow().open_statements(), 0);
}

// ============================================================================
// Nested selects
// ============================================================================

fn tree_configuration() -> Arc<Configuration> {
    Configuration::builder()
        .result_map(
            ResultMap::new("node", RustType::Object)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::nested("parent", "parent_id", "tree.find")),
        )
        .result_map(
            ResultMap::new("nodeWithChildren", RustType::Object)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::nested("children", "id", "tree.children").collection(true)),
        )
        .statement(
            MappedStatement::builder("tree.find", SqlCommandType::Select, sql("SELECT * FROM tree WHERE id = #{id}"))
                .result_map("node"),
        )
        .statement(
            MappedStatement::builder("tree.root", SqlCommandType::Select, sql("SELECT * FROM root WHERE id = #{id}"))
                .result_map("nodeWithChildren"),
        )
        .statement(
            MappedStatement::builder(
                "tree.children",
                SqlCommandType::Select,
                sql("SELECT * FROM tree WHERE parent_id = #{id}"),
            )
            .result_map("node"),
        )
        .build()
        .unwrap()
}

#[test]
fn circular_nested_select_is_a_cache_error() {
    let config = tree_configuration();
    // Node 1 names itself as parent.
    let conn = MockConnection::new(|_, params| {
        let id = params.first().cloned().unwrap_or(Value::Null);
        (vec!["id".into(), "parent_id".into()], vec![vec![id.clone(), id]])
    });
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("tree.find").unwrap();

    match executor.query(&find, &user(1), RowBounds::DEFAULT) {
        Err(Error::Cache(err)) => assert_eq!(err.kind, CacheErrorKind::CircularReference),
        other => panic!("expected circular reference, got {other:?}"),
    }
    assert_eq!(executor.local_cache_size(), 0);
}

#[test]
fn nested_selects_share_the_local_cache() {
    let config = tree_configuration();
    let conn = MockConnection::new(|sql, params| {
        let id = params.first().and_then(Value::as_i64).unwrap_or(0);
        if sql.contains("parent_id = ?") {
            let rows = vec![
                vec![Value::BigInt(id * 10 + 1), Value::Null],
                vec![Value::BigInt(id * 10 + 2), Value::BigInt(id)],
            ];
            (vec!["id".into(), "parent_id".into()], rows)
        } else {
            (vec!["id".into(), "parent_id".into()], vec![vec![Value::BigInt(id), Value::Null]])
        }
    });
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let root = config.mapped_statement("tree.root").unwrap();

    let result = executor.query(&root, &user(1), RowBounds::DEFAULT).unwrap();
    let children = result[0].path("children").and_then(Object::as_list).unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[1].path("parent.id"), Some(&Object::from(1i64)));
    // root, children of 1, and parent 1 of child 12
    assert_eq!(state.borrow().round_trips(), 3);
}

#[test]
fn cursor_rejects_nested_selects() {
    let config = tree_configuration();
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("tree.find").unwrap();

    assert!(matches!(
        executor.query_cursor(&find, &user(1), RowBounds::DEFAULT),
        Err(Error::Config(_))
    ));
    assert!(state.borrow().prepared.is_empty());
}

// ============================================================================
// Second-level cache
// ============================================================================

fn caching(config: &Arc<Configuration>, conn: MockConnection) -> CachingExecutor<BaseExecutor<MockConnection>> {
    CachingExecutor::new(BaseExecutor::simple(Arc::clone(config), conn))
}

#[test]
fn second_level_cache_publishes_on_commit() {
    let config = configuration(Settings::new());
    let find = config.mapped_statement("users.find").unwrap();

    let conn_a = MockConnection::echo();
    let state_a = conn_a.state();
    let mut a = caching(&config, conn_a);
    let conn_b = MockConnection::echo();
    let state_b = conn_b.state();
    let mut b = caching(&config, conn_b);

    a.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert!(a.has_pending_cache_writes());
    b.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state_b.borrow().round_trips(), 1);

    a.commit(true).unwrap();
    let conn_c = MockConnection::echo();
    let state_c = conn_c.state();
    let mut c = caching(&config, conn_c);
    let hit = c.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    assert_eq!(state_c.borrow().round_trips(), 0);
    assert_eq!(hit[0].path("name"), Some(&Object::from("user-1")));
    assert_eq!(state_a.borrow().round_trips(), 1);
    assert_eq!(config.cache("users").unwrap().size(), 1);
}

#[test]
fn second_level_cache_discards_on_rollback_and_flushes_on_update() {
    let config = configuration(Settings::new());
    let find = config.mapped_statement("users.find").unwrap();
    let insert = config.mapped_statement("users.insert").unwrap();
    let shared = config.cache("users").unwrap();

    let mut a = caching(&config, MockConnection::echo());
    a.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    a.rollback(true).unwrap();
    assert_eq!(shared.size(), 0);

    a.query(&find, &user(1), RowBounds::DEFAULT).unwrap();
    a.commit(true).unwrap();
    assert_eq!(shared.size(), 1);

    a.update(&insert, &mut named("z")).unwrap();
    assert_eq!(shared.size(), 1);
    a.commit(true).unwrap();
    assert_eq!(shared.size(), 0);
}

#[test]
fn callable_with_out_parameters_is_never_cached() {
    let config = configuration(Settings::new());
    let procedure = config.mapped_statement("users.procedure").unwrap();
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = caching(&config, conn);

    let param: Object = [("id", Object::from(1i64)), ("total", Object::null())].into_iter().collect();
    match executor.query(&procedure, &param, RowBounds::DEFAULT) {
        Err(Error::Cache(err)) => {
            assert_eq!(err.kind, CacheErrorKind::OutParameters);
            assert_eq!(err.statement_id.as_deref(), Some("users.procedure"));
        }
        other => panic!("expected out-parameter cache error, got {other:?}"),
    }
    executor.commit(true).unwrap();
    assert_eq!(config.cache("users").unwrap().size(), 0);
    assert!(state.borrow().prepared.is_empty());
}

#[test]
fn close_without_rollback_publishes_reads() {
    let config = configuration(Settings::new());
    let find = config.mapped_statement("users.find").unwrap();
    let mut a = caching(&config, MockConnection::echo());
    a.query(&find, &user(7), RowBounds::DEFAULT).unwrap();
    a.close(false).unwrap();
    assert!(a.is_closed());
    assert_eq!(config.cache("users").unwrap().size(), 1);
}

#[test]
fn dynamic_statements_key_on_composed_sql() {
    let source = SqlSource::new(SqlNode::mixed(vec![
        SqlNode::text("SELECT id, name FROM users WHERE id IN").unwrap(),
        ForeachNode::new("ids", SqlNode::text("#{id}").unwrap())
            .unwrap()
            .item("id")
            .open("(")
            .close(")")
            .separator(",")
            .into(),
    ]))
    .unwrap();
    let config = Configuration::builder()
        .statement(MappedStatement::builder("users.in", SqlCommandType::Select, source).result_type(RustType::Object))
        .build()
        .unwrap();
    let conn = MockConnection::echo();
    let state = conn.state();
    let mut executor = BaseExecutor::simple(Arc::clone(&config), conn);
    let find = config.mapped_statement("users.in").unwrap();

    let two = Object::from(serde_json::json!({"ids": [1, 2]}));
    let three = Object::from(serde_json::json!({"ids": [1, 2, 3]}));
    executor.query(&find, &two, RowBounds::DEFAULT).unwrap();
    executor.query(&find, &three, RowBounds::DEFAULT).unwrap();
    executor.query(&find, &two, RowBounds::DEFAULT).unwrap();
    let state = state.borrow();
    assert_eq!(state.round_trips(), 2);
    assert_eq!(state.queries[1].0, "SELECT id, name FROM users WHERE id IN (?,?,?)");
    assert_eq!(state.queries[1].1, vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]);
}

#[test]
fn closed_executor_reports_closed_before_composing() {
    let source = SqlSource::new(SqlNode::mixed(vec![
        SqlNode::text("SELECT id, name FROM users WHERE id IN").unwrap(),
        ForeachNode::new("ids", SqlNode::text("#{id}").unwrap())
            .unwrap()
            .item("id")
            .open("(")
            .close(")")
            .separator(",")
            .into(),
    ]))
    .unwrap();
    let config = Configuration::builder()
        .cache("users", CacheConfig::new())
        .statement(
            MappedStatement::builder("users.in", SqlCommandType::Select, source)
                .result_type(RustType::Object)
                .cache("users"),
        )
        .build()
        .unwrap();
    let find = config.mapped_statement("users.in").unwrap();
    let no_ids = Object::from(serde_json::json!({"ids": null}));

    let mut base = BaseExecutor::simple(Arc::clone(&config), MockConnection::echo());
    assert!(base.query(&find, &no_ids, RowBounds::DEFAULT).unwrap_err().is_binding());
    base.close(false).unwrap();
    assert!(matches!(
        base.query(&find, &no_ids, RowBounds::DEFAULT),
        Err(Error::Executor(e)) if e.kind == ExecutorErrorKind::Closed
    ));

    let mut caching = CachingExecutor::new(BaseExecutor::simple(Arc::clone(&config), MockConnection::echo()));
    caching.close(false).unwrap();
    assert!(matches!(
        caching.query(&find, &no_ids, RowBounds::DEFAULT),
        Err(Error::Executor(e)) if e.kind == ExecutorErrorKind::Closed
    ));
}
