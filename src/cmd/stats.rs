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

use std::fmt::Display;
use std::fmt::Formatter;

use clap::ValueEnum;
use serde::Serialize;

use crate::db::Database;
use crate::error::Fallible;
use crate::store::Store;
use crate::types::card::OwnerId;
use crate::types::mode::Mode;
use crate::types::timestamp::Timestamp;

#[derive(ValueEnum, Clone)]
pub enum StatsFormat {
    /// Plain text output.
    Text,
    /// JSON output.
    Json,
}

impl Display for StatsFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsFormat::Text => write!(f, "text"),
            StatsFormat::Json => write!(f, "json"),
        }
    }
}

pub fn print_owner_stats(database: &str, owner: OwnerId, format: StatsFormat) -> Fallible<()> {
    let stats = owner_stats(&Database::new(database)?, owner, Timestamp::now())?;
    match format {
        StatsFormat::Text => {
            println!("Cards: {}", stats.card_count);
            println!("Due now: {}", stats.due_count);
            match &stats.session_state {
                Some(state) => println!("Session: {state}"),
                None => println!("Session: none"),
            }
            if let Some(mode) = stats.session_mode {
                println!("Mode: {}", mode.as_str());
            }
        }
        StatsFormat::Json => {
            let stats_json = serde_json::to_string_pretty(&stats)?;
            println!("{}", stats_json);
        }
    }
    Ok(())
}

fn owner_stats(db: &Database, owner: OwnerId, now: Timestamp) -> Fallible<Stats> {
    let session = db.load_session(&owner)?;
    Ok(Stats {
        card_count: db.card_count(&owner)?,
        due_count: db.due_count(&owner, now)?,
        session_state: session.as_ref().map(|s| s.state.as_str().to_string()),
        session_mode: session.and_then(|s| s.mode),
        owner,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    owner: OwnerId,
    card_count: usize,
    due_count: usize,
    session_state: Option<String>,
    session_mode: Option<Mode>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::error::ErrorReport;
    use crate::session::machine::SessionStateMachine;
    use crate::types::card::Phrase;

    #[test]
    fn test_owner_stats() -> Fallible<()> {
        let dir = tempdir()?;
        let path = dir.path().join("lexicards.db");
        let mut db = Database::new(path.to_str().ok_or_else(|| ErrorReport::new("invalid path"))?)?;
        let owner = OwnerId::new("alice");
        let now = Timestamp::parse("2025-06-01T00:00:00Z")?;
        db.add_card(&owner, &Phrase::new("вещи", "things"), now)?;
        db.add_card(&owner, &Phrase::new("неделю", "week"), now)?;

        let stats = serde_json::to_value(owner_stats(&db, owner.clone(), now)?)?;
        assert_eq!(
            stats,
            json!({
                "owner": "alice",
                "cardCount": 2,
                "dueCount": 2,
                "sessionState": null,
                "sessionMode": null
            })
        );

        let mut machine = SessionStateMachine::new(owner.clone(), now);
        machine.set_mode("review_only")?;
        db.save_session(&machine.to_record())?;
        let stats = serde_json::to_value(owner_stats(&db, owner, now)?)?;
        assert_eq!(stats["sessionState"], json!("mode_choice"));
        assert_eq!(stats["sessionMode"], json!("review_only"));
        Ok(())
    }
}
