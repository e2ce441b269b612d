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

use crate::error::Fallible;
use crate::session::error::SessionError;
use crate::session::selector::CardSelector;
use crate::sm2;
use crate::store::RatingError;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::OwnerId;
use crate::types::mode::Mode;
use crate::types::state::Event;
use crate::types::state::SessionState;
use crate::types::timestamp::Timestamp;

/// The persisted form of a session.
#[derive(Clone, PartialEq, Debug)]
pub struct SessionRecord {
    pub owner: OwnerId,
    pub mode: Option<Mode>,
    pub state: SessionState,
    pub current_card: Option<CardId>,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

/// One learner's flashcard session.
///
/// Every operation either applies completely or fails with a
/// [`SessionError`] and leaves the session as it was.
#[derive(Clone, Debug)]
pub struct SessionStateMachine {
    owner: OwnerId,
    mode: Option<Mode>,
    state: SessionState,
    current_card: Option<Card>,
    started_at: Timestamp,
    ended_at: Option<Timestamp>,
}

impl SessionStateMachine {
    pub fn new(owner: OwnerId, now: Timestamp) -> Self {
        Self {
            owner,
            mode: None,
            state: SessionState::ModeChoice,
            current_card: None,
            started_at: now,
            ended_at: None,
        }
    }

    /// Rebuilds a session from its record. A current card that no longer
    /// exists, or belongs to someone else, sends the session back to the
    /// mode choice.
    pub fn resume(record: SessionRecord, store: &impl Store) -> Fallible<Self> {
        let mut state = record.state;
        let mut current_card = None;
        if let Some(id) = record.current_card {
            match store.card(id)? {
                Some(card) if card.owner() == &record.owner => {
                    current_card = Some(card);
                }
                _ => {
                    log::warn!(
                        "Session for {} referenced unavailable card {id}, returning to mode choice.",
                        record.owner
                    );
                    state = SessionState::ModeChoice;
                }
            }
        }
        Ok(Self {
            owner: record.owner,
            mode: record.mode,
            state,
            current_card,
            started_at: record.started_at,
            ended_at: record.ended_at,
        })
    }

    /// A fresh session for the same owner that remembers the chosen mode.
    pub fn restart(&self, now: Timestamp) -> Self {
        let mut fresh = Self::new(self.owner.clone(), now);
        fresh.mode = self.mode;
        fresh
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            owner: self.owner.clone(),
            mode: self.mode,
            state: self.state,
            current_card: self.current_card.as_ref().map(|card| card.id()),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_card(&self) -> Option<&Card> {
        self.current_card.as_ref()
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Timestamp> {
        self.ended_at
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Selects a mode. Unrecognized names keep the current mode.
    pub fn set_mode(&mut self, name: &str) -> Result<(), SessionError> {
        self.guard(Event::ChooseMode)?;
        match Mode::parse(name) {
            Some(mode) => self.mode = Some(mode),
            None => log::debug!("Ignoring unrecognized mode {name:?}."),
        }
        self.fire(Event::ChooseMode)
    }

    pub fn start(&mut self, store: &impl Store, now: Timestamp) -> Result<(), SessionError> {
        let (mode, event) = match self.mode {
            Some(Mode::ReviewOnly) => (Mode::ReviewOnly, Event::StartReview),
            Some(Mode::ReviewAndAnswer) => (Mode::ReviewAndAnswer, Event::StartReviewAndAnswer),
            None => return Err(SessionError::InvalidMode),
        };
        self.guard(event)?;
        let card = CardSelector::new(mode)
            .first_from(store, &self.owner, now)
            .map_err(SessionError::persistence)?;
        self.fire(event)?;
        self.current_card = card;
        Ok(())
    }

    /// Marks the current card as seen in review-only mode.
    pub fn review(&mut self) -> Result<(), SessionError> {
        self.fire(Event::Review)
    }

    pub fn answer_card(&mut self, answer: &str) -> Result<(), SessionError> {
        let correct = self
            .current_card
            .as_ref()
            .is_some_and(|card| card.is_correct_answer(answer));
        if correct {
            self.fire(Event::AnswerCorrectly)
        } else {
            self.fire(Event::AnswerIncorrectly)
        }
    }

    /// Rates the current card and returns it rescheduled. Nothing is
    /// persisted.
    fn rate(&mut self, rating: i64, now: Timestamp) -> Result<Option<Card>, SessionError> {
        self.guard(Event::RateAnswer)?;
        if !sm2::is_valid_rating(rating) {
            return Err(SessionError::InvalidRating(rating));
        }
        let rated = self.current_card.as_ref().map(|card| {
            let mut rated = card.clone();
            rated.set_scheduling(sm2::rate(card.scheduling(), rating, now));
            rated
        });
        if let Some(card) = &rated {
            let s = card.scheduling();
            log::debug!(
                "card {} rated {rating}: reps={} interval={:.2}d easiness={:.2} due={}",
                card.id(),
                s.repetitions,
                s.interval,
                s.easiness,
                s.next_due.map(|d| d.to_string()).unwrap_or_default()
            );
        }
        self.fire(Event::RateAnswer)?;
        self.current_card = rated.clone();
        Ok(rated)
    }

    /// Reschedules the current card and stores it together with the
    /// advanced session. If the card is refused the rating is dropped and the
    /// session stays where it is. If the session cannot be written, neither
    /// is stored and the error is returned.
    pub fn rate_quality(
        &mut self,
        store: &mut impl Store,
        rating: i64,
        now: Timestamp,
    ) -> Result<(), SessionError> {
        let mut staged = self.clone();
        let rated = staged.rate(rating, now)?;
        let record = staged.to_record();
        match rated {
            Some(card) => match store.save_rating(&card, &record) {
                Ok(()) => {}
                Err(RatingError::Card(e)) => {
                    log::error!("Failed to save rating for card {}: {e}", card.id());
                    return Ok(());
                }
                Err(RatingError::Session(e)) => {
                    log::error!("Failed to save session for {}: {e}", self.owner);
                    return Err(SessionError::persistence(e));
                }
            },
            None => store
                .save_session(&record)
                .map_err(SessionError::persistence)?,
        }
        *self = staged;
        Ok(())
    }

    /// Moves to the next card, or finishes the session when there is none.
    pub fn next(&mut self, store: &impl Store, now: Timestamp) -> Result<(), SessionError> {
        self.guard(Event::NextCard)?;
        let selector = self.selector()?;
        let next = selector
            .next_from(store, &self.owner, self.current_card.as_ref(), now)
            .map_err(SessionError::persistence)?;
        match next {
            Some(card) => {
                self.fire(Event::NextCard)?;
                self.current_card = Some(card);
            }
            None => {
                self.fire(Event::Finish)?;
                self.current_card = None;
                self.ended_at = Some(now);
            }
        }
        Ok(())
    }

    /// Moves to the previous card, or back to the mode choice when there is
    /// none.
    pub fn prev(&mut self, store: &impl Store, now: Timestamp) -> Result<(), SessionError> {
        self.guard(Event::NextCard)?;
        let selector = self.selector()?;
        let prev = selector
            .prev_from(store, &self.owner, self.current_card.as_ref(), now)
            .map_err(SessionError::persistence)?;
        match prev {
            Some(card) => {
                self.fire(Event::NextCard)?;
                self.current_card = Some(card);
                Ok(())
            }
            None => self.back_to_mode_choice(),
        }
    }

    pub fn back_to_mode_choice(&mut self) -> Result<(), SessionError> {
        self.fire(Event::BackToModeChoice)?;
        self.current_card = None;
        Ok(())
    }

    fn selector(&self) -> Result<CardSelector, SessionError> {
        match self.mode {
            Some(mode) => Ok(CardSelector::new(mode)),
            None => Err(SessionError::InvalidMode),
        }
    }

    fn guard(&self, event: Event) -> Result<SessionState, SessionError> {
        self.state
            .on(event)
            .ok_or_else(|| SessionError::transition(event, self.state))
    }

    fn fire(&mut self, event: Event) -> Result<(), SessionError> {
        let target = self.guard(event)?;
        log::debug!(
            "Session {}: {} --{}--> {}",
            self.owner,
            self.state,
            event,
            target
        );
        self.state = target;
        Ok(())
    }
}
