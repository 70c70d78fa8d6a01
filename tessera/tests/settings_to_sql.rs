//! Integration tests for configuring a compiler from settings.

use std::sync::Arc;

use tessera::core::settings_loader;
use tessera::prelude::*;

fn entities() -> Arc<EntityRegistry> {
    let registry = EntityRegistry::new();
    registry
        .register_builder(
            EntityBuilder::new("BlogPost")
                .key("PostId")
                .of_type(SqlType::Int)
                .column("Title")
                .of_type(SqlType::String),
        )
        .unwrap();
    Arc::new(registry)
}

fn by_title() -> Command {
    Command::Select(
        Select::from("BlogPost")
            .filter(Node::lambda(["p"], Node::param("p").member("Title").equals("hi")))
            .order_by(Node::key_selector("p", "PostId"))
            .skip(2)
            .take(2)
            .build()
            .unwrap(),
    )
}

// ── TOML ────────────────────────────────────────────────────────────

#[test]
fn test_toml_selects_mysql_with_flags() {
    let settings = settings_loader::from_toml_str(
        r#"
        provider = "mariadb"
        naming_convention = "snake_case"
        default_command_timeout = 15
        mysql_legacy_limit = true
        mysql_positional_parameters = true
        "#,
    )
    .unwrap();
    let compiler = tessera::compiler_from_settings(&settings, entities()).unwrap();
    let cmd = compiler.compile(&by_title()).unwrap();
    assert_eq!(
        cmd.sql,
        "SELECT `t0`.`post_id` AS `PostId`, `t0`.`title` AS `Title` FROM `blog_post` AS `t0` \
         WHERE `t0`.`title` = ? ORDER BY `t0`.`post_id` ASC LIMIT 2, 2"
    );
    assert_eq!(cmd.timeout_seconds, Some(15));
}

#[test]
fn test_json_selects_sql_server() {
    let settings = settings_loader::from_json_str(r#"{"provider": "mssql"}"#).unwrap();
    let compiler = tessera::compiler_from_settings(&settings, entities()).unwrap();
    let cmd = compiler.compile(&by_title()).unwrap();
    assert!(cmd.sql.contains("[__row_num] BETWEEN 3 AND 4"));
    assert_eq!(cmd.parameter("@p0"), Some(&Value::String("hi".into())));
}

// ── Errors ──────────────────────────────────────────────────────────

#[test]
fn test_unknown_provider_fails_before_compiling() {
    let settings = Settings::default().with_provider("Oracle");
    let err = tessera::compiler_from_settings(&settings, entities()).unwrap_err();
    assert_eq!(err.code(), "configuration");
    assert!(err.to_string().contains("Oracle"));
}
