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
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::session::machine::SessionRecord;
use crate::session::selector::order_cards;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::OwnerId;
use crate::types::mode::Mode;
use crate::types::timestamp::Timestamp;

/// Where sessions and cards live. The session engine only ever talks to
/// this trait.
pub trait Store {
    fn load_session(&self, owner: &OwnerId) -> Fallible<Option<SessionRecord>>;

    fn save_session(&mut self, session: &SessionRecord) -> Fallible<()>;

    fn card(&self, id: CardId) -> Fallible<Option<Card>>;

    /// The owner's candidate cards for `mode`, in selection order.
    fn cards_due_for(&self, owner: &OwnerId, mode: Mode, now: Timestamp) -> Fallible<Vec<Card>>;

    /// Overwrites an existing card.
    fn save_card(&mut self, card: &Card) -> Fallible<()>;

    /// Stores a rated card together with the session that rated it. Either
    /// both are written or neither is.
    fn save_rating(&mut self, card: &Card, session: &SessionRecord) -> Result<(), RatingError>;
}

/// Why a rating was not stored. In both cases nothing was written.
#[derive(Debug)]
pub enum RatingError {
    /// The card itself was refused, e.g. because it no longer exists.
    Card(ErrorReport),
    /// The session could not be saved.
    Session(ErrorReport),
}

/// A store that keeps everything in memory. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    cards: BTreeMap<CardId, Card>,
    sessions: HashMap<OwnerId, SessionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.acquire();
            for card in cards {
                inner.cards.insert(card.id(), card);
            }
        }
        store
    }

    pub fn remove_card(&self, id: CardId) -> Option<Card> {
        self.acquire().cards.remove(&id)
    }

    fn acquire(&self) -> MutexGuard<'_, Inner> {
        // No write can panic halfway, so a poisoned map is still consistent.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Store for MemoryStore {
    fn load_session(&self, owner: &OwnerId) -> Fallible<Option<SessionRecord>> {
        Ok(self.acquire().sessions.get(owner).cloned())
    }

    fn save_session(&mut self, session: &SessionRecord) -> Fallible<()> {
        self.acquire()
            .sessions
            .insert(session.owner.clone(), session.clone());
        Ok(())
    }

    fn card(&self, id: CardId) -> Fallible<Option<Card>> {
        Ok(self.acquire().cards.get(&id).cloned())
    }

    fn cards_due_for(&self, owner: &OwnerId, mode: Mode, now: Timestamp) -> Fallible<Vec<Card>> {
        let inner = self.acquire();
        let cards: Vec<Card> = inner
            .cards
            .values()
            .filter(|card| card.owner() == owner)
            .cloned()
            .collect();
        Ok(order_cards(mode, cards, now))
    }

    fn save_card(&mut self, card: &Card) -> Fallible<()> {
        let mut inner = self.acquire();
        match inner.cards.get_mut(&card.id()) {
            Some(existing) => {
                *existing = card.clone();
                Ok(())
            }
            None => fail(format!("no card with id {}", card.id())),
        }
    }

    fn save_rating(&mut self, card: &Card, session: &SessionRecord) -> Result<(), RatingError> {
        let mut inner = self.acquire();
        match inner.cards.get_mut(&card.id()) {
            Some(existing) => *existing = card.clone(),
            None => {
                return Err(RatingError::Card(ErrorReport::new(format!(
                    "no card with id {}",
                    card.id()
                ))));
            }
        }
        inner.sessions.insert(session.owner.clone(), session.clone());
        Ok(())
    }
}
