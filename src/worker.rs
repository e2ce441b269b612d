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

//! One task per active owner. Each task owns that owner's controller and
//! applies requests in the order they were received, so a session is never
//! touched by two callers at once. A task that sits idle stops, and the next
//! request for that owner starts a fresh one from the stored session.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::error::Fallible;
use crate::error::fail;
use crate::session::controller::Envelope;
use crate::session::controller::SessionController;
use crate::store::Store;
use crate::types::card::OwnerId;
use crate::types::timestamp::Timestamp;

const QUEUE_DEPTH: usize = 32;

const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

enum Request {
    Current,
    Command(Value),
}

struct Job {
    request: Request,
    now: Timestamp,
    reply: oneshot::Sender<Envelope>,
}

type Handles = HashMap<OwnerId, mpsc::Sender<Job>>;

#[derive(Clone)]
pub struct SessionWorkers<S> {
    store: S,
    handles: Arc<Mutex<Handles>>,
    idle_timeout: Duration,
}

impl<S> SessionWorkers<S>
where
    S: Store + Clone + Send + 'static,
{
    pub fn new(store: S) -> Self {
        Self::with_idle_timeout(store, IDLE_TIMEOUT)
    }

    /// Workers stop after `idle_timeout` without a request.
    pub fn with_idle_timeout(store: S, idle_timeout: Duration) -> Self {
        Self {
            store,
            handles: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// The envelope for the owner's session as it stands.
    pub async fn current(&self, owner: OwnerId) -> Fallible<Envelope> {
        self.dispatch(owner, Request::Current).await
    }

    /// Runs a JSON command against the owner's session.
    pub async fn command(&self, owner: OwnerId, command: Value) -> Fallible<Envelope> {
        self.dispatch(owner, Request::Command(command)).await
    }

    /// Number of live workers.
    pub fn active(&self) -> usize {
        self.acquire().values().filter(|tx| !tx.is_closed()).count()
    }

    async fn dispatch(&self, owner: OwnerId, request: Request) -> Fallible<Envelope> {
        let (reply, response) = oneshot::channel();
        let job = Job {
            request,
            now: Timestamp::now(),
            reply,
        };
        let mut sender = self.sender(&owner);
        if let Err(SendError(job)) = sender.send(job).await {
            self.forget(&owner, &sender);
            sender = self.sender(&owner);
            if sender.send(job).await.is_err() {
                return fail(format!("session worker for {owner} is unavailable."));
            }
        }
        match response.await {
            Ok(envelope) => Ok(envelope),
            Err(_) => {
                self.forget(&owner, &sender);
                fail(format!("session worker for {owner} stopped."))
            }
        }
    }

    fn sender(&self, owner: &OwnerId) -> mpsc::Sender<Job> {
        let mut handles = self.acquire();
        handles.retain(|_, tx| !tx.is_closed());
        if let Some(tx) = handles.get(owner) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run(self.store.clone(), owner.clone(), rx, self.idle_timeout));
        handles.insert(owner.clone(), tx.clone());
        tx
    }

    fn forget(&self, owner: &OwnerId, dead: &mpsc::Sender<Job>) {
        let mut handles = self.acquire();
        if handles.get(owner).is_some_and(|tx| tx.same_channel(dead)) {
            handles.remove(owner);
        }
    }

    fn acquire(&self) -> MutexGuard<'_, Handles> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn run<S: Store>(
    store: S,
    owner: OwnerId,
    mut jobs: mpsc::Receiver<Job>,
    idle_timeout: Duration,
) {
    log::debug!("Starting session worker for {owner}.");
    let mut controller = match SessionController::open(store, owner.clone(), Timestamp::now()) {
        Ok(controller) => controller,
        Err(e) => {
            log::error!("Failed to open session for {owner}: {e}");
            return;
        }
    };
    loop {
        match timeout(idle_timeout, jobs.recv()).await {
            Ok(Some(job)) => serve(&mut controller, job),
            Ok(None) => break,
            Err(_) => {
                log::debug!("Session worker for {owner} is idle.");
                jobs.close();
                // Jobs queued before the close still get an answer.
                while let Some(job) = jobs.recv().await {
                    serve(&mut controller, job);
                }
                break;
            }
        }
    }
    log::debug!("Session worker for {owner} stopped.");
}

fn serve<S: Store>(controller: &mut SessionController<S>, job: Job) {
    let envelope = match job.request {
        Request::Current => controller.show(),
        Request::Command(value) => controller.handle(&value, job.now),
    };
    // The caller may have gone away.
    let _ = job.reply.send(envelope);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::db::Database;
    use crate::error::ErrorReport;
    use crate::session::machine::SessionRecord;
    use crate::store::MemoryStore;
    use crate::store::RatingError;
    use crate::types::card::Card;
    use crate::types::card::CardId;
    use crate::types::card::Phrase;
    use crate::types::card::Scheduling;
    use crate::types::mode::Mode;

    fn deck() -> Fallible<MemoryStore> {
        let created_at = Timestamp::parse("2025-01-01T00:00:00Z")?;
        Ok(MemoryStore::with_cards(vec![
            Card::new(
                CardId::new(1),
                OwnerId::new("alice"),
                Phrase::new("заявление", "statement"),
                Scheduling::default(),
                created_at,
            ),
            Card::new(
                CardId::new(2),
                OwnerId::new("bob"),
                Phrase::new("неделю", "week"),
                Scheduling::default(),
                created_at,
            ),
        ]))
    }

    #[tokio::test]
    async fn test_commands_reach_the_right_session() -> Fallible<()> {
        let workers = SessionWorkers::new(deck()?);
        let alice = OwnerId::new("alice");
        let bob = OwnerId::new("bob");
        for owner in [&alice, &bob] {
            workers
                .command(
                    owner.clone(),
                    json!({"command": "choose_mode", "mode": "review_only"}),
                )
                .await?;
        }
        let reply = workers.command(alice.clone(), json!({"command": "start"})).await?;
        assert_eq!(reply.command, "review_card");
        let reply = workers.current(bob.clone()).await?;
        assert_eq!(reply.command, "mode_choice");
        assert_eq!(reply.mode, Some(Mode::ReviewOnly));
        assert_eq!(workers.active(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_commands_are_serialized() -> Fallible<()> {
        let workers = SessionWorkers::new(deck()?);
        let owner = OwnerId::new("alice");
        workers
            .command(
                owner.clone(),
                json!({"command": "choose_mode", "mode": "review_only"}),
            )
            .await?;
        let mut tasks = Vec::new();
        for _ in 0..10 {
            let workers = workers.clone();
            let owner = owner.clone();
            tasks.push(tokio::spawn(async move {
                workers.command(owner, json!({"command": "start"})).await
            }));
        }
        let mut started = 0;
        for task in tasks {
            let reply = match task.await {
                Ok(reply) => reply?,
                Err(e) => return fail(e.to_string()),
            };
            if !reply.is_exception() {
                started += 1;
            }
        }
        // Only the first start applies; the rest find the session underway.
        assert_eq!(started, 1);
        Ok(())
    }

    /// Fails to load sessions a fixed number of times.
    #[derive(Clone)]
    struct ColdStore {
        inner: MemoryStore,
        failures: Arc<AtomicUsize>,
    }

    impl Store for ColdStore {
        fn load_session(&self, owner: &OwnerId) -> Fallible<Option<SessionRecord>> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return fail("database is locked");
            }
            self.inner.load_session(owner)
        }

        fn save_session(&mut self, session: &SessionRecord) -> Fallible<()> {
            self.inner.save_session(session)
        }

        fn card(&self, id: CardId) -> Fallible<Option<Card>> {
            self.inner.card(id)
        }

        fn cards_due_for(&self, owner: &OwnerId, mode: Mode, now: Timestamp) -> Fallible<Vec<Card>> {
            self.inner.cards_due_for(owner, mode, now)
        }

        fn save_card(&mut self, card: &Card) -> Fallible<()> {
            self.inner.save_card(card)
        }

        fn save_rating(&mut self, card: &Card, session: &SessionRecord) -> Result<(), RatingError> {
            self.inner.save_rating(card, session)
        }
    }

    #[tokio::test]
    async fn test_dead_worker_is_respawned() -> Fallible<()> {
        let store = ColdStore {
            inner: deck()?,
            failures: Arc::new(AtomicUsize::new(1)),
        };
        let workers = SessionWorkers::new(store);
        let owner = OwnerId::new("alice");
        let first = workers.current(owner.clone()).await;
        assert!(first.is_err());
        assert_eq!(workers.active(), 0);
        let second = workers.current(owner).await?;
        assert_eq!(second.command, "mode_choice");
        assert_eq!(workers.active(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_workers_stop_and_come_back() -> Fallible<()> {
        let workers = SessionWorkers::with_idle_timeout(deck()?, Duration::from_millis(50));
        let owner = OwnerId::new("alice");
        workers
            .command(
                owner.clone(),
                json!({"command": "choose_mode", "mode": "review_only"}),
            )
            .await?;
        workers.current(OwnerId::new("bob")).await?;
        assert_eq!(workers.active(), 2);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(workers.active(), 0);

        let reply = workers.command(owner, json!({"command": "start"})).await?;
        assert_eq!(reply.command, "review_card");
        assert_eq!(reply.mode, Some(Mode::ReviewOnly));
        assert_eq!(workers.active(), 1);
        assert_eq!(workers.acquire().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_card_removed_elsewhere_resets_live_session() -> Fallible<()> {
        let dir = tempdir()?;
        let path = dir.path().join("lexicards.db");
        let path = path.to_str().ok_or_else(|| ErrorReport::new("invalid path"))?;
        let db = Database::new(path)?;
        let owner = OwnerId::new("alice");
        let now = Timestamp::now();
        let first = db.add_card(&owner, &Phrase::new("заявление", "statement"), now)?;
        db.add_card(&owner, &Phrase::new("неделю", "week"), now.plus_days(1))?;

        let workers = SessionWorkers::new(db);
        workers
            .command(
                owner.clone(),
                json!({"command": "choose_mode", "mode": "review_only"}),
            )
            .await?;
        let reply = workers.command(owner.clone(), json!({"command": "start"})).await?;
        assert_eq!(reply.command, "review_card");

        // Another process deletes the card on screen.
        assert!(Database::new(path)?.remove_card(first)?);

        let reply = workers.current(owner.clone()).await?;
        assert_eq!(reply.command, "mode_choice");
        assert_eq!(reply.mode, Some(Mode::ReviewOnly));
        let reply = serde_json::to_value(
            workers
                .command(owner.clone(), json!({"command": "review_answer"}))
                .await?,
        )?;
        assert_eq!(reply["result"]["code"], json!("invalid_transition"));
        let reply = serde_json::to_value(
            workers.command(owner, json!({"command": "start"})).await?,
        )?;
        assert_eq!(reply["command"], json!("review_card"));
        assert_eq!(reply["result"]["phrase"], json!("неделю"));
        Ok(())
    }
}
