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

use thiserror::Error;

use crate::error::ErrorReport;
use crate::types::state::Event;
use crate::types::state::SessionState;

/// Failures of a session command. None of them change the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("{message}")]
    InvalidTransition {
        event: Event,
        state: SessionState,
        message: String,
    },

    #[error("Please choose a review mode before starting.")]
    InvalidMode,

    #[error("Could not save your progress: {0}")]
    PersistenceFailure(String),

    #[error("{0}")]
    InvalidCommand(String),

    #[error("{0} is not a valid rating, please use a number from 0 to 5.")]
    InvalidRating(i64),
}

impl SessionError {
    /// A stable identifier clients can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidTransition { .. } => "invalid_transition",
            SessionError::InvalidMode => "invalid_mode",
            SessionError::PersistenceFailure(_) => "persistence_failure",
            SessionError::InvalidCommand(_) => "invalid_command",
            SessionError::InvalidRating(_) => "invalid_rating",
        }
    }

    pub fn transition(event: Event, state: SessionState) -> Self {
        let message = match (event, state) {
            (Event::NextCard | Event::Finish, SessionState::CorrectlyAnsweredCard) => {
                "Please rate your answer before continuing.".to_string()
            }
            (
                Event::NextCard | Event::Finish,
                SessionState::ReviewCard | SessionState::ReviewAndAnswerCard,
            ) => "You must review or answer this card before continuing.".to_string(),
            _ => format!("Cannot {} while in {}.", event, state),
        };
        SessionError::InvalidTransition {
            event,
            state,
            message,
        }
    }

    pub(crate) fn persistence(err: ErrorReport) -> Self {
        SessionError::PersistenceFailure(err.message().to_string())
    }
}
