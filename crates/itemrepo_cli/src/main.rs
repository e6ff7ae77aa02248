//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `itemrepo_core` linkage.
//! - Walk one filtered, ordered query page by page over each bundled backend
//!   and print the serialized pages.
//!
//! Settings come from `ITEMREPO_*` variables (a `.env` file is honored).
//! Setting `ITEMREPO_LOG_DIR` to an absolute path enables file logging.

use itemrepo_core::{
    field, init_logging, Backend, CursorPage, DataStore, Direction, DocumentCollection, HasKey,
    LoggingConfig, MemoryBackend, SqliteBackend, StoreConfig, StoreResult,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::process::ExitCode;

const PAGE_SIZE: i64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    id: String,
    value: i64,
}

impl HasKey for Sample {
    type Key = String;

    fn key(&self) -> &String {
        &self.id
    }
}

fn samples() -> Vec<Sample> {
    [5, 20, 15, 30]
        .into_iter()
        .enumerate()
        .map(|(n, value)| Sample {
            id: format!("s{n}"),
            value,
        })
        .collect()
}

fn walk<B>(backend: B, config: &StoreConfig) -> StoreResult<Vec<CursorPage<Sample>>>
where
    B: Backend<Sample> + 'static,
{
    let store = DataStore::with_config(backend, config);
    store.store_items(&samples())?;
    store
        .query()
        .filter(field("value").gt(10))
        .order_by("value", Direction::Ascending)
        .pages(PAGE_SIZE)
        .collect()
}

fn run() -> Result<(), String> {
    let config = StoreConfig::from_env().map_err(|err| err.to_string())?;
    if let Ok(dir) = std::env::var("ITEMREPO_LOG_DIR") {
        init_logging(&LoggingConfig::new(config.log_level.clone(), dir))
            .map_err(|err| err.to_string())?;
    }
    info!("event=cli_start module=cli status=ok");

    let sqlite = SqliteBackend::open_in_memory("samples").map_err(|err| err.to_string())?;
    let runs = [
        ("memory", walk(MemoryBackend::new(), &config)),
        ("document", walk(DocumentCollection::new(), &config)),
        ("sqlite", walk(sqlite, &config)),
    ];
    for (name, pages) in runs {
        let pages = pages.map_err(|err| format!("{name}: {err}"))?;
        for page in pages {
            let json = serde_json::to_string(&page).map_err(|err| err.to_string())?;
            println!("{name} {json}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    println!("itemrepo_core ping={}", itemrepo_core::ping());
    println!("itemrepo_core version={}", itemrepo_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("itemrepo_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}
