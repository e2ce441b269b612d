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

use crate::db::Database;
use crate::error::Fallible;
use crate::error::fail;
use crate::types::card::CardId;
use crate::types::card::OwnerId;
use crate::types::card::Phrase;
use crate::types::timestamp::Timestamp;

/// Parses a `key=value` grammatical tag.
pub fn parse_grammeme(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected `key=value`, got `{s}`")),
    }
}

pub fn add_card(
    database: &str,
    owner: OwnerId,
    phrase: &str,
    translation: &str,
    grammemes: Vec<(String, String)>,
) -> Fallible<CardId> {
    if phrase.trim().is_empty() {
        return fail("phrase must not be empty.");
    }
    if translation.trim().is_empty() {
        return fail("translation must not be empty.");
    }
    let db = Database::new(database)?;
    let mut phrase = Phrase::new(phrase, translation);
    phrase.grammemes.extend(grammemes);
    db.add_card(&owner, &phrase, Timestamp::now())
}
