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

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Serialize;

use crate::types::timestamp::Timestamp;

/// The easiness factor of a card that has never been rated.
pub const DEFAULT_EASINESS: f64 = 2.5;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
pub struct CardId(i64);

/// The learner a card or session belongs to.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct OwnerId(String);

/// Linguistic tags attached to a phrase, e.g. `pos` → `noun`.
pub type Grammemes = BTreeMap<String, String>;

#[derive(Clone, PartialEq, Debug)]
pub struct Card {
    id: CardId,
    owner: OwnerId,
    phrase: Phrase,
    scheduling: Scheduling,
    created_at: Timestamp,
}

/// The content being studied.
#[derive(Clone, PartialEq, Debug)]
pub struct Phrase {
    pub text: String,
    pub grammemes: Grammemes,
    pub translations: Vec<Translation>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Translation {
    pub text: String,
    /// Whether this is the right translation in the phrase's context.
    pub correct_for_context: bool,
}

/// Spaced-repetition metadata. Only the SM-2 scheduler produces new values.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Scheduling {
    pub repetitions: u32,
    /// In days.
    pub interval: f64,
    pub easiness: f64,
    pub next_due: Option<Timestamp>,
}

impl Default for Scheduling {
    fn default() -> Self {
        Self {
            repetitions: 0,
            interval: 0.0,
            easiness: DEFAULT_EASINESS,
            next_due: None,
        }
    }
}

impl Scheduling {
    /// Cards that have never been scheduled are always due.
    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.next_due {
            None => true,
            Some(next_due) => next_due <= now,
        }
    }
}

impl Card {
    pub fn new(
        id: CardId,
        owner: OwnerId,
        phrase: Phrase,
        scheduling: Scheduling,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            owner,
            phrase,
            scheduling,
            created_at,
        }
    }

    pub fn id(&self) -> CardId {
        self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn phrase(&self) -> &Phrase {
        &self.phrase
    }

    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// The context-correct translation, if the phrase has one.
    pub fn translation(&self) -> Option<&Translation> {
        self.phrase.translations.iter().find(|t| t.correct_for_context)
    }

    /// Whether `answer` matches the context-correct translation, ignoring
    /// surrounding whitespace and case.
    pub fn is_correct_answer(&self, answer: &str) -> bool {
        match self.translation() {
            Some(translation) => {
                translation.text.trim().to_lowercase() == answer.trim().to_lowercase()
            }
            None => false,
        }
    }

    pub(crate) fn set_scheduling(&mut self, scheduling: Scheduling) {
        self.scheduling = scheduling;
    }
}

impl Phrase {
    /// A phrase with a single context-correct translation.
    pub fn new(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            grammemes: Grammemes::new(),
            translations: vec![Translation {
                text: translation.into().trim().to_string(),
                correct_for_context: true,
            }],
        }
    }
}

impl CardId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl OwnerId {
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CardId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for CardId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for CardId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let id: i64 = FromSql::column_result(value)?;
        Ok(CardId(id))
    }
}

impl ToSql for OwnerId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for OwnerId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let owner: String = FromSql::column_result(value)?;
        Ok(OwnerId(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fallible;

    fn card_with(translations: Vec<Translation>) -> Fallible<Card> {
        let phrase = Phrase {
            text: "заявление".to_string(),
            grammemes: Grammemes::new(),
            translations,
        };
        Ok(Card::new(
            CardId::new(1),
            OwnerId::new("alice"),
            phrase,
            Scheduling::default(),
            Timestamp::parse("2025-01-01T00:00:00Z")?,
        ))
    }

    #[test]
    fn test_answer_matches_context_translation() -> Fallible<()> {
        let card = card_with(vec![
            Translation {
                text: "application".to_string(),
                correct_for_context: false,
            },
            Translation {
                text: "statement".to_string(),
                correct_for_context: true,
            },
        ])?;
        assert!(card.is_correct_answer("statement"));
        assert!(card.is_correct_answer("  Statement "));
        assert!(!card.is_correct_answer("application"));
        assert!(!card.is_correct_answer("wrong"));
        Ok(())
    }

    #[test]
    fn test_no_context_translation_is_never_correct() -> Fallible<()> {
        let card = card_with(vec![Translation {
            text: "statement".to_string(),
            correct_for_context: false,
        }])?;
        assert!(card.translation().is_none());
        assert!(!card.is_correct_answer("statement"));
        Ok(())
    }

    #[test]
    fn test_unscheduled_card_is_due() -> Fallible<()> {
        let now = Timestamp::parse("2025-01-01T00:00:00Z")?;
        let mut scheduling = Scheduling::default();
        assert!(scheduling.is_due(now));
        scheduling.next_due = Some(now);
        assert!(scheduling.is_due(now));
        scheduling.next_due = Some(now.plus_days(1));
        assert!(!scheduling.is_due(now));
        Ok(())
    }
}
