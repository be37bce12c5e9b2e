//! The optional on-disk audit sink. Journals are informational:
//! the core never reads them back for correctness, and a write failure is
//! logged and otherwise ignored by the caller.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::game::Game;
use crate::game_block::GameBlock;
use crate::main_block::MainBlock;
use crate::mv::Move;

/// Journals a node's activity to external storage.
pub trait Journal: Send + Sync {
    fn record_move(&self, node_id: &str, mv: &Move) {
        let _ = (node_id, mv);
    }
    fn record_block(&self, node_id: &str, block: &GameBlock) {
        let _ = (node_id, block);
    }
    fn record_main_block(&self, node_id: &str, block: &MainBlock) {
        let _ = (node_id, block);
    }
    fn record_completed_game(&self, node_id: &str, game: &Game) {
        let _ = (node_id, game);
    }
    fn record_log(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op journal, the default for tests and for nodes that don't care
/// about audit output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

impl Journal for NullJournal {}

/// Appends to the per-node JSON files: `{nodeId}_mempool.json`,
/// `{nodeId}_blockchain.json`, `{nodeId}_completeGames.json`, and a shared
/// `logs.json`.
pub struct JsonFileJournal {
    dir: PathBuf,
}

impl JsonFileJournal {
    pub fn new(dir: impl Into<PathBuf>) -> JsonFileJournal {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            log::warn!("could not create journal directory {:?}: {}", dir, e);
        }
        JsonFileJournal { dir }
    }

    fn append_to_array(&self, filename: &str, value: Value) {
        let path = self.dir.join(filename);
        let mut arr: Vec<Value> = match File::open(&path) {
            Ok(mut f) => {
                let mut contents = String::new();
                let _ = f.read_to_string(&mut contents);
                serde_json::from_str(&contents).unwrap_or_default()
            }
            Err(_) => Vec::new(),
        };
        arr.push(value);
        match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
        {
            Ok(mut f) => {
                if let Err(e) = f.write_all(serde_json::to_string_pretty(&arr).unwrap_or_default().as_bytes()) {
                    log::warn!("journal write to {:?} failed: {}", path, e);
                }
            }
            Err(e) => log::warn!("journal open of {:?} failed: {}", path, e),
        }
    }

    fn to_json<T: Serialize>(v: &T) -> Value {
        serde_json::to_value(v).unwrap_or(Value::Null)
    }
}

impl Journal for JsonFileJournal {
    fn record_move(&self, node_id: &str, mv: &Move) {
        self.append_to_array(&format!("{}_mempool.json", node_id), Self::to_json(mv));
    }

    fn record_block(&self, node_id: &str, block: &GameBlock) {
        self.append_to_array(&format!("{}_blockchain.json", node_id), Self::to_json(block));
    }

    fn record_main_block(&self, node_id: &str, block: &MainBlock) {
        self.append_to_array(&format!("{}_blockchain.json", node_id), Self::to_json(block));
    }

    fn record_completed_game(&self, node_id: &str, game: &Game) {
        self.append_to_array(
            &format!("{}_completeGames.json", node_id),
            Self::to_json(game),
        );
    }

    fn record_log(&self, message: &str) {
        let entry = serde_json::json!({
            "timestamp": chrono::Utc::now().timestamp(),
            "message": message,
        });
        self.append_to_array("logs.json", entry);
    }
}
