#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use shelf::store::LibrarySnapshot;
use tempfile::TempDir;

pub fn shelf_cmd() -> Command {
    let mut cmd = Command::cargo_bin("shelf").expect("binary");
    cmd.env_remove("SHELF_DIR");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// A scratch library directory driven through the CLI.
pub struct TestLibrary {
    dir: TempDir,
}

impl TestLibrary {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn library_file(&self) -> PathBuf {
        self.dir.path().join("library.json")
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = shelf_cmd();
        cmd.arg("--dir").arg(self.dir.path());
        cmd
    }

    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.dir.path().join(".shelf.toml");
        fs::write(&path, contents).expect("write config");
        path
    }

    /// Run a command with `--json` and return the `data` field.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("json output");
        assert_eq!(value["status"], "success");
        value["data"].clone()
    }

    /// Run a command with `--json` that must fail; returns the whole envelope.
    pub fn json_error(&self, args: &[&str], code: i32) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .assert()
            .code(code)
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("json error output");
        assert_eq!(value["status"], "error");
        value
    }

    pub fn new_book(&self, title: &str) -> String {
        id_of(&self.json(&["book", "new", title]))
    }

    pub fn new_stage(&self, book: &str, title: &str) -> String {
        id_of(&self.json(&["stage", "new", book, title]))
    }

    pub fn new_task(&self, stage: &str, title: &str) -> String {
        id_of(&self.json(&["task", "new", stage, title]))
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        let content = fs::read_to_string(self.library_file()).expect("read library");
        serde_json::from_str(&content).expect("parse library")
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("record id").to_string()
}
