//! Property tests for the compiler.
//!
//! Covers constant binding, determinism, mutation rejection and the page
//! windows every dialect emits.

use std::sync::Arc;

use proptest::prelude::*;
use tessera_db::query::command::DeleteCommand;
use tessera_db::{
    Command, Dialect, EmittedCommand, EntityBuilder, EntityRegistry, MySql, Node, QueryContext,
    Select, SqlCompiler, SqlServer, SqlType, Sqlite, Value,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn dialects() -> Vec<Dialect> {
    vec![
        Dialect::new(SqlServer),
        Dialect::new(MySql::default()),
        Dialect::new(MySql::default().with_legacy_limit(true).with_positional_parameters(true)),
        Dialect::new(Sqlite),
    ]
}

fn compiler(dialect: Dialect) -> SqlCompiler {
    let entities = EntityRegistry::new();
    entities
        .register_builder(
            EntityBuilder::new("User")
                .table("users")
                .key("Id")
                .of_type(SqlType::Int)
                .column("Name")
                .of_type(SqlType::String),
        )
        .unwrap();
    SqlCompiler::new(QueryContext::new(Arc::new(dialect), Arc::new(entities)))
}

fn name_filter(build: impl Fn(Node) -> Node) -> Command {
    let body = build(Node::param("u").member("Name"));
    Command::Select(
        Select::from("User")
            .filter(Node::lambda(["u"], body))
            .build()
            .unwrap(),
    )
}

fn paged(take: u64, skip: u64) -> Command {
    Command::Select(
        Select::from("User")
            .project(Node::key_selector("u", "Id"))
            .order_by(Node::key_selector("u", "Id"))
            .skip(skip)
            .take(take)
            .build()
            .unwrap(),
    )
}

fn carries(cmd: &EmittedCommand, needle: &str) -> bool {
    cmd.parameters.iter().any(|(_, v)| match v {
        Value::String(s) => s.contains(needle),
        _ => false,
    })
}

// ── Properties ──────────────────────────────────────────────────────

proptest! {
    /// Property: a caller string never reaches the SQL text, whatever it
    /// contains; it is only ever a parameter value.
    #[test]
    fn constants_are_always_bound(tail in "\\PC{0,24}") {
        let hostile = format!("'; DROP TABLE users; --{tail}");
        for dialect in dialects() {
            let compiler = compiler(dialect);
            let shapes = [
                name_filter(|name| name.equals(hostile.as_str())),
                name_filter(|name| name.starts_with(hostile.as_str())),
                name_filter(|name| name.contains(hostile.as_str())),
            ];
            for command in &shapes {
                let cmd = compiler.compile(command).unwrap();
                prop_assert!(!cmd.sql.contains("DROP TABLE"), "{}", cmd.sql);
                prop_assert!(carries(&cmd, "DROP TABLE users"));
            }
        }
    }

    /// Property: compiling the same command twice is byte-identical.
    #[test]
    fn compilation_is_deterministic(take in 1u64..100, skip in 0u64..1000, name in "[a-z]{1,8}") {
        for dialect in dialects() {
            let compiler = compiler(dialect);
            let command = Command::Select(
                Select::from("User")
                    .filter(Node::lambda(["u"], Node::param("u").member("Name").equals(name.as_str())))
                    .order_by(Node::key_selector("u", "Id"))
                    .skip(skip)
                    .take(take)
                    .build()
                    .unwrap(),
            );
            let first = compiler.compile(&command).unwrap();
            let second = compiler.compile(&command).unwrap();
            prop_assert_eq!(&first.sql, &second.sql);
            prop_assert_eq!(&first.parameters, &second.parameters);
        }
    }

    /// Property: the window-function rewrite numbers exactly skip+1 ..= skip+take.
    #[test]
    fn sql_server_window_matches_page(take in 1u64..=100, skip in 1u64..=1000) {
        let cmd = compiler(Dialect::new(SqlServer)).compile(&paged(take, skip)).unwrap();
        let expected = format!("[__row_num] BETWEEN {} AND {}", skip + 1, skip + take);
        prop_assert!(cmd.sql.contains(&expected), "{}", cmd.sql);
        prop_assert!(cmd.sql.starts_with("SELECT [Id] FROM (SELECT [t0].[Id], ROW_NUMBER()"));
    }

    /// Property: native limit dialects end with the page as LIMIT/OFFSET.
    #[test]
    fn limit_dialects_match_page(take in 1u64..=100, skip in 0u64..=1000) {
        let expected = if skip == 0 {
            format!("LIMIT {take}")
        } else {
            format!("LIMIT {take} OFFSET {skip}")
        };
        for dialect in [Dialect::new(Sqlite), Dialect::new(MySql::default())] {
            let cmd = compiler(dialect).compile(&paged(take, skip)).unwrap();
            prop_assert!(cmd.sql.ends_with(&expected), "{}", cmd.sql);
        }

        let legacy = compiler(Dialect::new(MySql::default().with_legacy_limit(true)))
            .compile(&paged(take, skip))
            .unwrap();
        let expected = if skip == 0 {
            format!("LIMIT {take}")
        } else {
            format!("LIMIT {skip}, {take}")
        };
        prop_assert!(legacy.sql.ends_with(&expected), "{}", legacy.sql);
    }
}

// ── Mutation rejection ──────────────────────────────────────────────

#[test]
fn test_unconditioned_delete_rejected_for_every_dialect() {
    let command = Command::Delete(DeleteCommand {
        entity: "User".into(),
        predicate: None,
        key: None,
        timeout: None,
    });
    for dialect in dialects() {
        let name = dialect.name().to_string();
        let err = compiler(dialect).compile(&command).unwrap_err();
        assert_eq!(err.code(), "unconditioned_mutation", "{name}");
    }
}

#[test]
fn test_positional_parameters_follow_occurrence() {
    let dialect = Dialect::new(MySql::default().with_positional_parameters(true));
    let cmd = compiler(dialect)
        .compile(&name_filter(|name| name.clone().equals("a").or(name.equals("b"))))
        .unwrap();
    assert!(cmd.sql.ends_with("WHERE `t0`.`Name` = ? OR `t0`.`Name` = ?"));
    let values: Vec<&Value> = cmd.values().collect();
    assert_eq!(
        values,
        vec![&Value::String("a".into()), &Value::String("b".into())]
    );
}
