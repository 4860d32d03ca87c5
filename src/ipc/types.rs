use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::clock::Clock;
use crate::config::Config;
use crate::model::Principal;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub principal: Option<Principal>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
    pub clock: Clock,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let clock = config.clock();
        Self {
            workspace: None,
            db: None,
            config,
            clock,
        }
    }
}
