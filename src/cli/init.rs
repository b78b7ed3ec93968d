//! shelf init command implementation
//!
//! Creates the library directory, a default `.shelf.toml` and an empty
//! library file.

use std::path::{Path, PathBuf};

use crate::cli::GlobalOptions;
use crate::config::{Config, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::storage::FileStore;

#[derive(serde::Serialize)]
struct InitReport {
    dir: PathBuf,
    library: PathBuf,
    created: InitCreated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    dir: bool,
    config: bool,
    library: bool,
}

pub fn run(globals: &GlobalOptions) -> Result<()> {
    let dir = globals.library_dir();

    let created_dir = ensure_dir(&dir)?;
    let created_config = ensure_config(&dir)?;
    let config = Config::load(&dir.join(CONFIG_FILE))?;
    let store = FileStore::new(config.library_path(&dir), config.storage.lock_timeout_ms);
    let created_library = store.init()?;

    let report = InitReport {
        dir: dir.clone(),
        library: store.path().to_path_buf(),
        created: InitCreated {
            dir: created_dir,
            config: created_config,
            library: created_library,
        },
    };

    let mut created_items = Vec::new();
    if created_dir {
        created_items.push(format!("{}/", dir.display()));
    }
    if created_config {
        created_items.push(CONFIG_FILE.to_string());
    }
    if created_library {
        created_items.push(config.storage.file.clone());
    }

    let header = if created_items.is_empty() {
        "shelf init: nothing to do".to_string()
    } else {
        "shelf init: initialized library".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("dir", dir.display().to_string());
    human.push_summary(
        "created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    human.push_next_step("shelf book new <title>");

    emit_success(
        OutputOptions {
            json: globals.json,
            quiet: globals.quiet,
        },
        "init",
        &report,
        Some(&human),
    )
}

fn ensure_config(dir: &Path) -> Result<bool> {
    let config_path = dir.join(CONFIG_FILE);
    if config_path.exists() {
        if !config_path.is_file() {
            return Err(Error::InvalidConfig(format!(
                "{} exists but is not a file: {}",
                CONFIG_FILE,
                config_path.display()
            )));
        }
        return Ok(false);
    }

    Config::default().save(&config_path)?;
    Ok(true)
}

fn ensure_dir(path: &Path) -> Result<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "expected a directory at {}",
                path.display()
            )));
        }
        return Ok(false);
    }

    std::fs::create_dir_all(path)?;
    Ok(true)
}
