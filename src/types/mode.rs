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

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlError;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Serialize;

use crate::error::ErrorReport;
use crate::error::fail;

/// How a session walks through the deck.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Browse every card in the order it was added, without rating.
    ReviewOnly,
    /// Type an answer for each due card and rate your recall.
    ReviewAndAnswer,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::ReviewOnly, Mode::ReviewAndAnswer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ReviewOnly => "review_only",
            Mode::ReviewAndAnswer => "review_and_answer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Mode::ReviewOnly => "Review your flashcards in the order you added them.",
            Mode::ReviewAndAnswer => "Answer the flashcards that are due and rate how well you remembered.",
        }
    }

    /// Returns `None` for names that are not a recognized mode.
    pub fn parse(name: &str) -> Option<Mode> {
        Mode::ALL.into_iter().find(|mode| mode.as_str() == name)
    }
}

impl TryFrom<String> for Mode {
    type Error = ErrorReport;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match Mode::parse(&value) {
            Some(mode) => Ok(mode),
            None => fail(format!("Invalid mode: {}", value)),
        }
    }
}

impl ToSql for Mode {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Mode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let string: String = FromSql::column_result(value)?;
        Mode::try_from(string).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
