// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;

pub const DEFAULT_CONFIG_PATH: &str = "lexicards.toml";

#[derive(Deserialize, Clone, PartialEq, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database.
    pub database: PathBuf,
    /// Address the server listens on.
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("lexicards.db"),
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration. Without an explicit path, a missing
    /// `lexicards.toml` means defaults.
    pub fn load(path: Option<&Path>) -> Fallible<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return fail(format!(
                        "config file {} does not exist.",
                        path.display()
                    ));
                }
                Self::read(path)
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::read(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn parse(content: &str) -> Fallible<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line flags on top of the file's values.
    pub fn with_overrides(mut self, database: Option<PathBuf>, bind: Option<String>) -> Self {
        if let Some(database) = database {
            self.database = database;
        }
        if let Some(bind) = bind {
            self.bind = bind;
        }
        self
    }

    pub fn database_path(&self) -> Fallible<&str> {
        self.database
            .to_str()
            .ok_or_else(|| ErrorReport::new("invalid database path"))
    }

    fn read(path: &Path) -> Fallible<Self> {
        log::debug!("Reading configuration from {}.", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}
