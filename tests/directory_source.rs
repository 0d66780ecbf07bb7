#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the built-in `directory` source driven from a
//! configuration file, plus the configuration surface around it
//! (validation warnings and `updater init`).

mod common;

use std::fs;
use std::sync::Arc;

use common::{IntegrationTestContext, TestContextBuilder};
use updater_cli::config::{example, validation};
use updater_cli::fingerprint::VersionFingerprint;
use updater_cli::logging::Logger;
use updater_cli::orchestrator::run_batch;
use updater_cli::sources::SourceRegistry;

/// Configuration installing `share/` into `app/`, wiping everything except
/// `settings.ini` first.
fn share_config(ctx: &IntegrationTestContext) -> String {
    format!(
        r#"
[[target]]
name = "app"
source = "directory"
directory = "app"
clean_all = true
cleanup_exceptions = ["settings.ini"]

[target.options]
path = '{}'
"#,
        ctx.target_dir("share").display()
    )
}

fn build_share() -> IntegrationTestContext {
    let ctx = TestContextBuilder::new()
        .with_file("share/VERSION", "1.2.3\n")
        .with_file("share/app.exe", "build 1.2.3")
        .with_file("share/lib/core.dll", "core")
        .with_file("app/settings.ini", "mode=prod")
        .with_file("app/stale.tmp", "old")
        .build();
    let config = share_config(&ctx);
    fs::write(ctx.config_path(), config).unwrap();
    ctx
}

#[test]
fn first_run_installs_share_and_records_numeric_version() {
    let ctx = build_share();
    let config = ctx.load_config();

    let log = Arc::new(Logger::new("test"));
    let summary = run_batch(&ctx.update_context(log, false), &config.targets);

    assert_eq!(summary.successes, 1);
    let app = ctx.target_dir("app");
    assert_eq!(fs::read_to_string(app.join("app.exe")).unwrap(), "build 1.2.3");
    assert_eq!(fs::read_to_string(app.join("lib/core.dll")).unwrap(), "core");
    assert_eq!(fs::read_to_string(app.join("settings.ini")).unwrap(), "mode=prod");
    assert!(!app.join("stale.tmp").exists());
    assert_eq!(
        ctx.installed("app"),
        Some(VersionFingerprint::from_version(1, 2, 3, 0))
    );
}

#[test]
fn second_run_is_up_to_date() {
    let ctx = build_share();
    let config = ctx.load_config();

    let log = Arc::new(Logger::new("test"));
    run_batch(&ctx.update_context(Arc::clone(&log), false), &config.targets);
    fs::write(ctx.target_dir("app").join("local.cache"), "x").unwrap();

    let summary = run_batch(&ctx.update_context(log, false), &config.targets);
    assert_eq!(summary.skips, 1);
    assert!(ctx.target_dir("app").join("local.cache").exists());
}

#[test]
fn new_version_on_share_triggers_reinstall() {
    let ctx = build_share();
    let config = ctx.load_config();

    let log = Arc::new(Logger::new("test"));
    run_batch(&ctx.update_context(Arc::clone(&log), false), &config.targets);

    fs::write(ctx.target_dir("share/VERSION"), "1.3").unwrap();
    fs::write(ctx.target_dir("share/app.exe"), "build 1.3").unwrap();
    fs::remove_file(ctx.target_dir("share/lib/core.dll")).unwrap();

    let summary = run_batch(&ctx.update_context(log, false), &config.targets);
    assert_eq!(summary.successes, 1);
    let app = ctx.target_dir("app");
    assert_eq!(fs::read_to_string(app.join("app.exe")).unwrap(), "build 1.3");
    assert!(!app.join("lib/core.dll").exists());
    assert_eq!(
        ctx.installed("app"),
        Some(VersionFingerprint::from_version(1, 3, 0, 0))
    );
}

#[test]
fn unavailable_share_fails_without_touching_the_target() {
    let ctx = build_share();
    let config = ctx.load_config();
    fs::remove_dir_all(ctx.target_dir("share")).unwrap();

    let log = Arc::new(Logger::new("test"));
    let summary = run_batch(&ctx.update_context(Arc::clone(&log), false), &config.targets);

    assert_eq!(summary.errors, 1);
    assert!(ctx.target_dir("app").join("stale.tmp").exists());
    let message = log.target_entries()[0].message.clone().unwrap();
    assert!(message.starts_with("check for update: "), "{message}");
}

#[test]
fn validation_flags_problems_without_failing_load() {
    let ctx = TestContextBuilder::new()
        .with_config(
            r#"
[[target]]
name = "app"
source = "ftp"
directory = "app"
kill_process = true
cleanup_exceptions = ["keep"]
cleanup_paths = ["../outside"]

[[target]]
name = "APP"
source = "Directory"
directory = "other"
"#,
        )
        .build();
    let config = ctx.load_config();

    let registry = SourceRegistry::with_builtin();
    let warnings: Vec<String> = validation::validate_all(&config, &registry.names())
        .iter()
        .map(ToString::to_string)
        .collect();

    let has = |needle: &str| warnings.iter().any(|w| w.contains(needle));
    assert!(has("unknown source 'ftp'"), "{warnings:#?}");
    assert!(has("used more than once"), "{warnings:#?}");
    assert!(has("kill_process is set"), "{warnings:#?}");
    assert!(has("cleanup_exceptions has no effect"), "{warnings:#?}");
    assert!(has("escapes the target directory"), "{warnings:#?}");
    assert!(has("does not exist yet"), "{warnings:#?}");
    assert!(!has("unknown source 'Directory'"), "{warnings:#?}");
}

#[test]
fn init_writes_a_loadable_example() {
    let ctx = IntegrationTestContext::new();
    example::write_example(&ctx.config_path(), false).unwrap();

    let config = ctx.load_config();
    let names: Vec<String> = config.targets.iter().map(|t| t.display_name()).collect();
    assert_eq!(names, vec!["billing", "reports"]);
    assert_eq!(
        config.targets[0].directory,
        ctx.root_path().join("apps/billing")
    );

    let registry = SourceRegistry::with_builtin();
    let warnings = validation::validate_all(&config, &registry.names());
    assert!(
        warnings.iter().all(|w| w.message.contains("does not exist yet")),
        "{warnings:#?}"
    );
}
