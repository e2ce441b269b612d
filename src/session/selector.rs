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

//! Picks the current, next and previous card of a session.
//!
//! In review-only mode every card is visited once, in the order it was added
//! (ties broken by id). In review-and-answer mode only due cards qualify,
//! least-repeated first and then most overdue first, and the order is
//! recomputed on every call since rating a card moves it out of the queue.

use crate::error::Fallible;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::OwnerId;
use crate::types::mode::Mode;
use crate::types::timestamp::Timestamp;

/// Filters and sorts `cards` into selection order for `mode`.
pub fn order_cards(mode: Mode, cards: Vec<Card>, now: Timestamp) -> Vec<Card> {
    match mode {
        Mode::ReviewOnly => {
            let mut cards = cards;
            cards.sort_by_key(creation_key);
            cards
        }
        Mode::ReviewAndAnswer => {
            let mut cards: Vec<Card> = cards
                .into_iter()
                .filter(|card| card.scheduling().is_due(now))
                .collect();
            // Never-scheduled cards sort before any due date.
            cards.sort_by_key(|card| {
                let scheduling = card.scheduling();
                (scheduling.repetitions, scheduling.next_due, card.id())
            });
            cards
        }
    }
}

fn creation_key(card: &Card) -> (Timestamp, CardId) {
    (card.created_at(), card.id())
}

#[derive(Clone, Copy, Debug)]
pub struct CardSelector {
    mode: Mode,
}

impl CardSelector {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// The card a freshly started session shows.
    pub fn first(&self, ordered: &[Card]) -> Option<Card> {
        ordered.first().cloned()
    }

    pub fn next(&self, ordered: &[Card], current: Option<&Card>) -> Option<Card> {
        match (self.mode, current) {
            (Mode::ReviewOnly, Some(current)) => {
                let key = creation_key(current);
                ordered.iter().find(|card| creation_key(card) > key).cloned()
            }
            (Mode::ReviewOnly, None) => self.first(ordered),
            (Mode::ReviewAndAnswer, _) => self.first(ordered),
        }
    }

    /// Review-and-answer sessions keep no history, so they never have a
    /// previous card.
    pub fn prev(&self, ordered: &[Card], current: Option<&Card>) -> Option<Card> {
        match (self.mode, current) {
            (Mode::ReviewOnly, Some(current)) => {
                let key = creation_key(current);
                ordered
                    .iter()
                    .rev()
                    .find(|card| creation_key(card) < key)
                    .cloned()
            }
            (Mode::ReviewOnly, None) => None,
            (Mode::ReviewAndAnswer, _) => None,
        }
    }

    pub fn first_from(
        &self,
        store: &impl Store,
        owner: &OwnerId,
        now: Timestamp,
    ) -> Fallible<Option<Card>> {
        let ordered = store.cards_due_for(owner, self.mode, now)?;
        Ok(self.first(&ordered))
    }

    pub fn next_from(
        &self,
        store: &impl Store,
        owner: &OwnerId,
        current: Option<&Card>,
        now: Timestamp,
    ) -> Fallible<Option<Card>> {
        let ordered = store.cards_due_for(owner, self.mode, now)?;
        Ok(self.next(&ordered, current))
    }

    pub fn prev_from(
        &self,
        store: &impl Store,
        owner: &OwnerId,
        current: Option<&Card>,
        now: Timestamp,
    ) -> Fallible<Option<Card>> {
        if self.mode == Mode::ReviewAndAnswer {
            return Ok(None);
        }
        let ordered = store.cards_due_for(owner, self.mode, now)?;
        Ok(self.prev(&ordered, current))
    }
}
