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

pub fn remove_card(database: &str, card_id: CardId) -> Fallible<()> {
    let db = Database::new(database)?;
    if !db.remove_card(card_id)? {
        return fail(format!("no card with id {card_id}."));
    }
    log::debug!("Removed card {card_id}.");
    Ok(())
}
