use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use xs_api::{create_runtime_from_dir, CreateRuntimeOptions};
use xs_core::{LoadKind, ScriptError};
use xs_runtime::{CommandExecutor, LineNumbering, RuntimeConfig, TestContext};

fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("xscript-rs-it-{}-{}", name, nanos))
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent should be created");
    }
    fs::write(path, content).expect("file should be written");
}

#[derive(Default)]
struct Recorder {
    commands: Vec<String>,
}

impl CommandExecutor for Recorder {
    fn do_command(
        &mut self,
        context: &TestContext,
        name: &str,
        target: &str,
        value: &str,
    ) -> Result<(), ScriptError> {
        self.commands.push(format!("{} {} {}", name, target, value).trim_end().to_string());
        match name {
            "store" => context.store(value, target),
            "assertText" if target != value => Err(ScriptError::assertion(format!(
                "expected '{}' but was '{}'",
                value, target
            ))),
            _ => Ok(()),
        }
    }

    fn evaluates_to_true(
        &mut self,
        _context: &TestContext,
        expression: &str,
    ) -> Result<bool, ScriptError> {
        Ok(expression.trim() == "yes")
    }
}

fn shop_fixture(name: &str) -> PathBuf {
    let base = temp_path(name);
    let root = base.join("scripts");
    write_file(&base.join("global_testdata.properties"), "host=global.example\nuser=global\n");
    write_file(&root.join("package_testdata.properties"), "greeting=hello\n");
    write_file(
        &root.join("shop/Login.xml"),
        r#"<?xml version="1.0"?>
<scriptmodule>
  <parameter name="user"/>
  <command name="type" target="id=user" value="@{user}"/>
  <command name="type" target="id=pass" value="${password}"/>
  <command name="click" target="id=login"/>
</scriptmodule>"#,
    );
    write_file(&root.join("shop/Login_data.properties"), "password=s3cr3t\nuser=module\n");
    write_file(
        &root.join("shop/Banner.xml"),
        r#"<scriptmodule>
  <command name="click" target="id=banner"/>
</scriptmodule>"#,
    );
    write_file(
        &root.join("shop/Order.xml"),
        r#"<?xml version="1.0"?>
<testcase baseURL="http://shop.example">
  <action name="Login"/>
  <command name="open" value="/login"/>
  <module name="shop.Login">
    <parameter name="user" value="${user}"/>
  </module>
  <module name="shop.Banner">
    <condition>${showBanner}</condition>
  </module>
  <command name="store" target="${greeting} ${user}" value="greeted"/>
  <command name="assertText" target="${greeted}" value="hello alice"/>
  <postSteps>
    <command name="echo" value="bye ${user}"/>
  </postSteps>
</testcase>"#,
    );
    write_file(&root.join("shop/Order_data.csv"), "user,alice\nshowBanner,no\n");
    root
}

#[test]
fn runs_a_test_case_from_files() {
    let root = shop_fixture("order");
    let runtime = create_runtime_from_dir(CreateRuntimeOptions::new(&root)).expect("runtime");
    let mut recorder = Recorder::default();

    runtime
        .execute_script("w1", "shop.Order", &mut recorder)
        .expect("test case should pass");

    assert_eq!(
        recorder.commands,
        vec![
            "open /login",
            "type id=user alice",
            "type id=pass s3cr3t",
            "click id=login",
            "store hello alice greeted",
            "assertText hello alice hello alice",
            "echo bye alice",
        ]
    );
    let context = runtime.context("w1");
    assert_eq!(context.base_url(), "http://shop.example");
    assert_eq!(context.resolve("${host}").expect("resolve"), "global.example");
    assert_eq!(context.scope_depth(), 0);

    assert_eq!(runtime.script_size(LoadKind::Module, "shop.Login").expect("size"), 3);
    assert_eq!(runtime.script_size(LoadKind::TestCase, "shop.Order").expect("size"), 10);
}

#[test]
fn failure_reports_script_positions() {
    let root = shop_fixture("order-failure");
    write_file(&root.join("shop/Order_data.csv"), "user,bob\nshowBanner,yes\n");
    let runtime = create_runtime_from_dir(CreateRuntimeOptions::new(&root)).expect("runtime");
    let mut recorder = Recorder::default();

    let error = runtime
        .execute_script("w1", "shop.Order", &mut recorder)
        .expect_err("assertion should fail");

    assert_eq!(error.code, "TESTCASE_FAILED");
    assert_eq!(error.suppressed.len(), 1);
    let failure = &error.suppressed[0];
    assert!(failure.is_assertion());
    let frame = &failure.trace[0];
    assert_eq!(
        (frame.package.as_str(), frame.element.as_str(), frame.file.as_str(), frame.line),
        ("shop", "assertText", "Order.xml", 10)
    );
    assert!(recorder.commands.contains(&"click id=banner".to_string()));
    assert_eq!(recorder.commands.last().map(String::as_str), Some("echo bye bob"));
}

#[test]
fn file_line_numbering_uses_source_lines() {
    let root = shop_fixture("order-lines");
    write_file(&root.join("shop/Order_data.csv"), "user,carol\n");
    let runtime = create_runtime_from_dir(CreateRuntimeOptions {
        scripts_dir: root,
        config: Some(RuntimeConfig {
            line_numbering: LineNumbering::File,
            ..RuntimeConfig::default()
        }),
    })
    .expect("runtime");
    let mut recorder = Recorder::default();

    let error = runtime
        .execute_script("w1", "shop.Order", &mut recorder)
        .expect_err("assertion should fail");
    assert_eq!(error.suppressed[0].trace[0].line, 12);
}

#[test]
fn missing_module_fails_before_anything_runs() {
    let root = temp_path("missing-module");
    write_file(
        &root.join("T.xml"),
        r#"<testcase><command name="click" target="a"/><module name="gone.Module"/></testcase>"#,
    );
    let runtime = create_runtime_from_dir(CreateRuntimeOptions::new(&root)).expect("runtime");
    let mut recorder = Recorder::default();

    let error = runtime
        .execute_script("w1", "T", &mut recorder)
        .expect_err("load should fail");
    assert_eq!(error.code, "LOAD_NOT_FOUND");
    assert!(recorder.commands.is_empty());
}

#[test]
fn malformed_script_is_a_load_failure() {
    let root = temp_path("malformed");
    write_file(&root.join("T.xml"), "<testcase><command name=\"click\"></testcase>");
    let runtime = create_runtime_from_dir(CreateRuntimeOptions::new(&root)).expect("runtime");

    let error = runtime
        .script_size(LoadKind::TestCase, "T")
        .expect_err("parse should fail");
    assert_eq!(error.code, "XML_PARSE_ERROR");
}

#[test]
fn workers_share_scripts_but_not_state() {
    let root = shop_fixture("order-workers");
    let runtime = Arc::new(create_runtime_from_dir(CreateRuntimeOptions::new(&root)).expect("runtime"));

    let handles = (0..6)
        .map(|index| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                let worker = format!("worker-{}", index);
                let mut recorder = Recorder::default();
                runtime
                    .execute_script(&worker, "shop.Order", &mut recorder)
                    .expect("test case should pass");
                assert!(runtime.shutdown_context(&worker));
                recorder.commands.len()
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        assert_eq!(handle.join().expect("worker should finish"), 7);
    }
    assert_eq!(runtime.worker_count(), 0);
}
