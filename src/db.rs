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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::Params;
use rusqlite::Transaction;
use rusqlite::config::DbConfig;

use crate::error::Fallible;
use crate::error::fail;
use crate::session::machine::SessionRecord;
use crate::store::RatingError;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::Grammemes;
use crate::types::card::OwnerId;
use crate::types::card::Phrase;
use crate::types::card::Scheduling;
use crate::types::card::Translation;
use crate::types::mode::Mode;
use crate::types::state::SessionState;
use crate::types::timestamp::Timestamp;

const CARD_COLUMNS: &str =
    "card_id, owner, phrase, grammemes, repetitions, interval, easiness, next_due, created_at";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(database_path: &str) -> Fallible<Self> {
        let mut conn = Connection::open(database_path)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
        {
            let tx = conn.transaction()?;
            if !probe_schema_exists(&tx)? {
                log::debug!("Creating schema in {database_path}.");
                tx.execute_batch(include_str!("schema.sql"))?;
                tx.commit()?;
            }
        }
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self { conn })
    }

    /// Add a new card, with its translations, and return its id.
    pub fn add_card(&self, owner: &OwnerId, phrase: &Phrase, now: Timestamp) -> Fallible<CardId> {
        let grammemes = serde_json::to_string(&phrase.grammemes)?;
        let scheduling = Scheduling::default();
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        let sql = "insert into cards (owner, phrase, grammemes, repetitions, interval, easiness, next_due, created_at) values (?, ?, ?, ?, ?, ?, ?, ?) returning card_id;";
        let card_id: CardId = tx.query_row(
            sql,
            (
                owner,
                &phrase.text,
                &grammemes,
                scheduling.repetitions,
                scheduling.interval,
                scheduling.easiness,
                scheduling.next_due,
                now,
            ),
            |row| row.get(0),
        )?;
        for translation in &phrase.translations {
            insert_translation(&tx, card_id, translation)?;
        }
        tx.commit()?;
        log::debug!("Added card {card_id} for {owner}.");
        Ok(card_id)
    }

    /// Delete a card. Sessions showing it go back to the mode choice. Returns
    /// whether the card existed.
    pub fn remove_card(&self, card_id: CardId) -> Fallible<bool> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        tx.execute(
            "update sessions set state = ?, current_card_id = null where current_card_id = ?;",
            (SessionState::ModeChoice, card_id),
        )?;
        let deleted = tx.execute("delete from cards where card_id = ?;", [card_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn card_count(&self, owner: &OwnerId) -> Fallible<usize> {
        let conn = self.acquire();
        let sql = "select count(*) from cards where owner = ?;";
        let count: i64 = conn.query_row(sql, [owner], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of the owner's cards that are due at `now`.
    pub fn due_count(&self, owner: &OwnerId, now: Timestamp) -> Fallible<usize> {
        let conn = self.acquire();
        let sql = "select count(*) from cards where owner = ? and (next_due is null or next_due <= ?);";
        let count: i64 = conn.query_row(sql, (owner, now), |row| row.get(0))?;
        Ok(count as usize)
    }

    fn acquire(&self) -> MutexGuard<'_, Connection> {
        // Transactions roll back on drop, so a poisoned connection is still
        // usable.
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Store for Database {
    fn load_session(&self, owner: &OwnerId) -> Fallible<Option<SessionRecord>> {
        let conn = self.acquire();
        let sql = "select mode, state, current_card_id, started_at, ended_at from sessions where owner = ?;";
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([owner])?;
        if let Some(row) = rows.next()? {
            Ok(Some(SessionRecord {
                owner: owner.clone(),
                mode: row.get(0)?,
                state: row.get(1)?,
                current_card: row.get(2)?,
                started_at: row.get(3)?,
                ended_at: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    fn save_session(&mut self, session: &SessionRecord) -> Fallible<()> {
        let conn = self.acquire();
        write_session(&conn, session)
    }

    fn card(&self, id: CardId) -> Fallible<Option<Card>> {
        let conn = self.acquire();
        let sql = format!("select {CARD_COLUMNS} from cards where card_id = ?;");
        let mut cards = query_cards(&conn, &sql, [id])?;
        Ok(cards.pop())
    }

    fn cards_due_for(&self, owner: &OwnerId, mode: Mode, now: Timestamp) -> Fallible<Vec<Card>> {
        let conn = self.acquire();
        match mode {
            Mode::ReviewOnly => {
                let sql = format!(
                    "select {CARD_COLUMNS} from cards where owner = ? order by created_at, card_id;"
                );
                query_cards(&conn, &sql, [owner])
            }
            Mode::ReviewAndAnswer => {
                let sql = format!(
                    "select {CARD_COLUMNS} from cards where owner = ? and (next_due is null or next_due <= ?) order by repetitions, next_due nulls first, card_id;"
                );
                query_cards(&conn, &sql, (owner, now))
            }
        }
    }

    fn save_card(&mut self, card: &Card) -> Fallible<()> {
        let conn = self.acquire();
        write_scheduling(&conn, card)
    }

    fn save_rating(&mut self, card: &Card, session: &SessionRecord) -> Result<(), RatingError> {
        let mut conn = self.acquire();
        let tx = conn
            .transaction()
            .map_err(|e| RatingError::Session(e.into()))?;
        write_scheduling(&tx, card).map_err(RatingError::Card)?;
        write_session(&tx, session).map_err(RatingError::Session)?;
        tx.commit().map_err(|e| RatingError::Session(e.into()))?;
        Ok(())
    }
}

fn write_session(conn: &Connection, session: &SessionRecord) -> Fallible<()> {
    let sql = "insert into sessions (owner, mode, state, current_card_id, started_at, ended_at) values (?, ?, ?, ?, ?, ?) on conflict (owner) do update set mode = excluded.mode, state = excluded.state, current_card_id = excluded.current_card_id, started_at = excluded.started_at, ended_at = excluded.ended_at;";
    conn.execute(
        sql,
        (
            &session.owner,
            session.mode,
            session.state,
            session.current_card,
            session.started_at,
            session.ended_at,
        ),
    )?;
    Ok(())
}

fn write_scheduling(conn: &Connection, card: &Card) -> Fallible<()> {
    let s = card.scheduling();
    let sql = "update cards set repetitions = ?, interval = ?, easiness = ?, next_due = ? where card_id = ?;";
    let updated = conn.execute(
        sql,
        (s.repetitions, s.interval, s.easiness, s.next_due, card.id()),
    )?;
    if updated == 0 {
        return fail(format!("no card with id {}", card.id()));
    }
    Ok(())
}

fn query_cards(conn: &Connection, sql: &str, params: impl Params) -> Fallible<Vec<Card>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut cards = Vec::new();
    while let Some(row) = rows.next()? {
        let card_id: CardId = row.get(0)?;
        let owner: OwnerId = row.get(1)?;
        let text: String = row.get(2)?;
        let grammemes: String = row.get(3)?;
        let grammemes: Grammemes = serde_json::from_str(&grammemes)?;
        let scheduling = Scheduling {
            repetitions: row.get(4)?,
            interval: row.get(5)?,
            easiness: row.get(6)?,
            next_due: row.get(7)?,
        };
        let created_at: Timestamp = row.get(8)?;
        let phrase = Phrase {
            text,
            grammemes,
            translations: query_translations(conn, card_id)?,
        };
        cards.push(Card::new(card_id, owner, phrase, scheduling, created_at));
    }
    Ok(cards)
}

fn query_translations(conn: &Connection, card_id: CardId) -> Fallible<Vec<Translation>> {
    let sql = "select phrase, correct_for_context from translations where card_id = ? order by translation_id;";
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([card_id])?;
    let mut translations = Vec::new();
    while let Some(row) = rows.next()? {
        translations.push(Translation {
            text: row.get(0)?,
            correct_for_context: row.get(1)?,
        });
    }
    Ok(translations)
}

fn insert_translation(tx: &Transaction, card_id: CardId, translation: &Translation) -> Fallible<()> {
    let sql = "insert into translations (card_id, phrase, correct_for_context) values (?, ?, ?);";
    tx.execute(
        sql,
        (card_id, &translation.text, translation.correct_for_context),
    )?;
    Ok(())
}

fn probe_schema_exists(tx: &Transaction) -> Fallible<bool> {
    let sql = "select count(*) from sqlite_master where type='table' AND name=?;";
    let count: i64 = tx.query_row(sql, ["cards"], |row| row.get(0))?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tempfile::tempdir;

    use super::*;
    use crate::error::ErrorReport;
    use crate::session::selector::order_cards;

    fn open() -> Fallible<(TempDir, Database)> {
        let dir = tempdir()?;
        let path = dir.path().join("lexicards.db");
        let db = Database::new(
            path.to_str()
                .ok_or_else(|| ErrorReport::new("invalid path"))?,
        )?;
        Ok((dir, db))
    }

    fn at(s: &str) -> Fallible<Timestamp> {
        Timestamp::parse(s)
    }

    #[test]
    fn test_add_and_load_card() -> Fallible<()> {
        let (_dir, db) = open()?;
        let owner = OwnerId::new("alice");
        let mut phrase = Phrase::new("заявление", "statement");
        phrase.grammemes.insert("case".to_string(), "nom".to_string());
        phrase.translations.push(Translation {
            text: "application".to_string(),
            correct_for_context: false,
        });
        let now = at("2025-03-04T05:06:07Z")?;
        let id = db.add_card(&owner, &phrase, now)?;

        let card = db.card(id)?;
        let expected = Card::new(id, owner.clone(), phrase, Scheduling::default(), now);
        assert_eq!(card, Some(expected));
        assert_eq!(db.card(CardId::new(id.into_inner() + 1))?, None);
        assert_eq!(db.card_count(&owner)?, 1);
        assert_eq!(db.card_count(&OwnerId::new("bob"))?, 0);
        Ok(())
    }

    #[test]
    fn test_save_card_updates_scheduling() -> Fallible<()> {
        let (_dir, mut db) = open()?;
        let owner = OwnerId::new("alice");
        let now = at("2025-03-04T00:00:00Z")?;
        let id = db.add_card(&owner, &Phrase::new("неделю", "week"), now)?;
        let mut card = db.card(id)?.ok_or_else(|| ErrorReport::new("missing card"))?;
        let scheduling = Scheduling {
            repetitions: 3,
            interval: 16.8,
            easiness: 1.68,
            next_due: Some(now.plus_days(17)),
        };
        card.set_scheduling(scheduling);
        db.save_card(&card)?;
        assert_eq!(db.card(id)?.map(|c| c.scheduling()), Some(scheduling));
        assert_eq!(db.due_count(&owner, now)?, 0);
        assert_eq!(db.due_count(&owner, now.plus_days(17))?, 1);

        let ghost = Card::new(
            CardId::new(999),
            owner,
            Phrase::new("x", "y"),
            Scheduling::default(),
            now,
        );
        assert!(db.save_card(&ghost).is_err());
        Ok(())
    }

    #[test]
    fn test_session_round_trip() -> Fallible<()> {
        let (_dir, mut db) = open()?;
        let owner = OwnerId::new("alice");
        let now = at("2025-03-04T00:00:00Z")?;
        let id = db.add_card(&owner, &Phrase::new("неделю", "week"), now)?;
        assert_eq!(db.load_session(&owner)?, None);

        let mut record = SessionRecord {
            owner: owner.clone(),
            mode: None,
            state: SessionState::ModeChoice,
            current_card: None,
            started_at: now,
            ended_at: None,
        };
        db.save_session(&record)?;
        assert_eq!(db.load_session(&owner)?, Some(record.clone()));

        record.mode = Some(Mode::ReviewAndAnswer);
        record.state = SessionState::IncorrectlyAnsweredCard;
        record.current_card = Some(id);
        db.save_session(&record)?;
        assert_eq!(db.load_session(&owner)?, Some(record));
        Ok(())
    }

    #[test]
    fn test_rating_is_rolled_back_with_its_session() -> Fallible<()> {
        let (_dir, mut db) = open()?;
        let owner = OwnerId::new("alice");
        let now = at("2025-03-04T00:00:00Z")?;
        let id = db.add_card(&owner, &Phrase::new("неделю", "week"), now)?;
        let before = SessionRecord {
            owner: owner.clone(),
            mode: Some(Mode::ReviewAndAnswer),
            state: SessionState::CorrectlyAnsweredCard,
            current_card: Some(id),
            started_at: now,
            ended_at: None,
        };
        db.save_session(&before)?;

        let mut card = db.card(id)?.ok_or_else(|| ErrorReport::new("missing card"))?;
        card.set_scheduling(Scheduling {
            repetitions: 1,
            interval: 1.0,
            easiness: 2.6,
            next_due: Some(now.plus_days(1)),
        });
        // The session points at a card that does not exist, so its write
        // violates the foreign key after the card update went through.
        let broken = SessionRecord {
            state: SessionState::RatedYourAnswerForCard,
            current_card: Some(CardId::new(id.into_inner() + 100)),
            ..before.clone()
        };
        let result = db.save_rating(&card, &broken);
        assert!(matches!(result, Err(RatingError::Session(_))));
        assert_eq!(db.card(id)?.map(|c| c.scheduling()), Some(Scheduling::default()));
        assert_eq!(db.load_session(&owner)?, Some(before.clone()));

        let rated = SessionRecord {
            state: SessionState::RatedYourAnswerForCard,
            ..before
        };
        if let Err(RatingError::Card(e) | RatingError::Session(e)) = db.save_rating(&card, &rated) {
            return Err(e);
        }
        assert_eq!(db.card(id)?.map(|c| c.scheduling()), Some(card.scheduling()));
        assert_eq!(db.load_session(&owner)?, Some(rated));
        Ok(())
    }

    #[test]
    fn test_removing_current_card_resets_session() -> Fallible<()> {
        let (_dir, mut db) = open()?;
        let owner = OwnerId::new("alice");
        let now = at("2025-03-04T00:00:00Z")?;
        let id = db.add_card(&owner, &Phrase::new("неделю", "week"), now)?;
        db.save_session(&SessionRecord {
            owner: owner.clone(),
            mode: Some(Mode::ReviewOnly),
            state: SessionState::ReviewCard,
            current_card: Some(id),
            started_at: now,
            ended_at: None,
        })?;
        assert!(db.remove_card(id)?);
        assert!(!db.remove_card(id)?);
        let record = db.load_session(&owner)?;
        assert_eq!(record.as_ref().map(|r| r.state), Some(SessionState::ModeChoice));
        assert_eq!(record.and_then(|r| r.current_card), None);
        assert_eq!(db.card_count(&owner)?, 0);
        Ok(())
    }

    #[test]
    fn test_sql_order_matches_selector() -> Fallible<()> {
        let (_dir, mut db) = open()?;
        let alice = OwnerId::new("alice");
        let bob = OwnerId::new("bob");
        let base = at("2025-01-01T00:00:00Z")?;
        let now = at("2025-06-01T00:00:00Z")?;
        let plan: [(u32, Option<Timestamp>); 6] = [
            (0, None),
            (2, Some(now.plus_days(3))),
            (1, Some(now.minus_days(3))),
            (0, Some(now.minus_days(1))),
            (1, Some(now.minus_days(5))),
            (0, Some(now)),
        ];
        for (i, (repetitions, next_due)) in plan.into_iter().enumerate() {
            let phrase = Phrase::new(format!("phrase {i}"), format!("translation {i}"));
            // Added newest first, so creation order is the reverse of id order.
            let id = db.add_card(&alice, &phrase, base.minus_days(i as i64))?;
            let mut card = db.card(id)?.ok_or_else(|| ErrorReport::new("missing card"))?;
            card.set_scheduling(Scheduling {
                repetitions,
                next_due,
                ..Scheduling::default()
            });
            db.save_card(&card)?;
        }
        db.add_card(&bob, &Phrase::new("вещи", "things"), base)?;

        for mode in Mode::ALL {
            let from_sql = db.cards_due_for(&alice, mode, now)?;
            let all = db.cards_due_for(&alice, Mode::ReviewOnly, now)?;
            let in_memory = order_cards(mode, all, now);
            assert_eq!(from_sql, in_memory);
            assert!(from_sql.iter().all(|c| c.owner() == &alice));
        }
        assert_eq!(db.cards_due_for(&alice, Mode::ReviewAndAnswer, now)?.len(), 5);
        assert_eq!(db.due_count(&alice, now)?, 5);
        Ok(())
    }

    #[test]
    fn test_reopen_keeps_data() -> Fallible<()> {
        let dir = tempdir()?;
        let path = dir.path().join("lexicards.db");
        let path = path.to_str().ok_or_else(|| ErrorReport::new("invalid path"))?;
        let owner = OwnerId::new("alice");
        let now = at("2025-03-04T00:00:00Z")?;
        {
            let db = Database::new(path)?;
            db.add_card(&owner, &Phrase::new("неделю", "week"), now)?;
        }
        let db = Database::new(path)?;
        assert_eq!(db.card_count(&owner)?, 1);
        Ok(())
    }
}
