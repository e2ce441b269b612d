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

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlError;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;

use crate::error::ErrorReport;
use crate::error::fail;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionState {
    ModeChoice,
    ReviewCard,
    ReviewAndAnswerCard,
    ReviewedCard,
    CorrectlyAnsweredCard,
    IncorrectlyAnsweredCard,
    RatedYourAnswerForCard,
    FinishedReview,
    FinishedReviewAndAnswer,
}

/// The named transitions of the session state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
    ChooseMode,
    StartReview,
    StartReviewAndAnswer,
    AnswerCorrectly,
    AnswerIncorrectly,
    RateAnswer,
    Review,
    NextCard,
    BackToModeChoice,
    Finish,
}

impl SessionState {
    pub const ALL: [SessionState; 9] = [
        SessionState::ModeChoice,
        SessionState::ReviewCard,
        SessionState::ReviewAndAnswerCard,
        SessionState::ReviewedCard,
        SessionState::CorrectlyAnsweredCard,
        SessionState::IncorrectlyAnsweredCard,
        SessionState::RatedYourAnswerForCard,
        SessionState::FinishedReview,
        SessionState::FinishedReviewAndAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::ModeChoice => "mode_choice",
            SessionState::ReviewCard => "review_card",
            SessionState::ReviewAndAnswerCard => "review_and_answer_card",
            SessionState::ReviewedCard => "reviewed_card",
            SessionState::CorrectlyAnsweredCard => "correctly_answered_card",
            SessionState::IncorrectlyAnsweredCard => "incorrectly_answered_card",
            SessionState::RatedYourAnswerForCard => "rated_your_answer_for_card",
            SessionState::FinishedReview => "finished_review",
            SessionState::FinishedReviewAndAnswer => "finished_review_and_answer",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SessionState::FinishedReview | SessionState::FinishedReviewAndAnswer
        )
    }

    /// States in which the session shows a current card.
    pub fn bears_card(&self) -> bool {
        !matches!(self, SessionState::ModeChoice) && !self.is_finished()
    }

    /// The transition table. Returns `None` when `event` is not defined in
    /// this state.
    pub fn on(self, event: Event) -> Option<SessionState> {
        use Event as E;
        use SessionState as S;
        match (self, event) {
            (S::ModeChoice, E::ChooseMode) => Some(S::ModeChoice),
            (S::ModeChoice, E::StartReview) => Some(S::ReviewCard),
            (S::ModeChoice, E::StartReviewAndAnswer) => Some(S::ReviewAndAnswerCard),
            (S::ReviewAndAnswerCard, E::AnswerCorrectly) => Some(S::CorrectlyAnsweredCard),
            (S::ReviewAndAnswerCard, E::AnswerIncorrectly) => Some(S::IncorrectlyAnsweredCard),
            (S::CorrectlyAnsweredCard, E::RateAnswer) => Some(S::RatedYourAnswerForCard),
            (S::ReviewCard, E::Review) => Some(S::ReviewedCard),
            (S::ReviewedCard, E::NextCard) => Some(S::ReviewCard),
            (S::RatedYourAnswerForCard | S::IncorrectlyAnsweredCard, E::NextCard) => {
                Some(S::ReviewAndAnswerCard)
            }
            (
                S::ReviewedCard | S::RatedYourAnswerForCard | S::IncorrectlyAnsweredCard,
                E::BackToModeChoice,
            ) => Some(S::ModeChoice),
            (S::ReviewedCard, E::Finish) => Some(S::FinishedReview),
            (S::RatedYourAnswerForCard | S::IncorrectlyAnsweredCard, E::Finish) => {
                Some(S::FinishedReviewAndAnswer)
            }
            _ => None,
        }
    }
}

impl Event {
    /// The name a learner knows the event by. The two start and the two
    /// answer branches share a name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ChooseMode => "choose_mode",
            Event::StartReview | Event::StartReviewAndAnswer => "start",
            Event::AnswerCorrectly | Event::AnswerIncorrectly => "answer_card",
            Event::RateAnswer => "rate_answer",
            Event::Review => "review",
            Event::NextCard => "next_card",
            Event::BackToModeChoice => "back_to_mode_choice",
            Event::Finish => "finish",
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for SessionState {
    type Error = ErrorReport;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match SessionState::ALL
            .into_iter()
            .find(|state| state.as_str() == value)
        {
            Some(state) => Ok(state),
            None => fail(format!("Invalid session state: {}", value)),
        }
    }
}

impl ToSql for SessionState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SessionState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let string: String = FromSql::column_result(value)?;
        SessionState::try_from(string).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
