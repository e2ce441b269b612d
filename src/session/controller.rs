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

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::session::error::SessionError;
use crate::session::machine::SessionStateMachine;
use crate::session::serializer::Payload;
use crate::session::serializer::render;
use crate::store::Store;
use crate::types::card::OwnerId;
use crate::types::mode::Mode;
use crate::types::timestamp::Timestamp;

/// A learner's command, as sent over the wire.
#[derive(Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Start,
    ChooseMode { mode: String },
    Answer { answer: String },
    ReviewAnswer,
    Next,
    Prev,
    RateQuality { rating: i64 },
}

const COMMAND_NAMES: [&str; 7] = [
    "start",
    "choose_mode",
    "answer",
    "review_answer",
    "next",
    "prev",
    "rate_quality",
];

impl Command {
    pub fn parse(value: &Value) -> Result<Command, SessionError> {
        let name = match value.get("command").and_then(Value::as_str) {
            Some(name) => name,
            None => {
                return Err(SessionError::InvalidCommand(
                    "Missing `command` field.".to_string(),
                ));
            }
        };
        if !COMMAND_NAMES.contains(&name) {
            return Err(SessionError::InvalidCommand(format!(
                "`{name}` is not a valid command."
            )));
        }
        serde_json::from_value(value.clone()).map_err(|e| {
            SessionError::InvalidCommand(format!("Invalid payload for `{name}`: {e}"))
        })
    }

    /// Whether this command starts over once a session is finished.
    fn restarts(&self) -> bool {
        matches!(self, Command::Start | Command::ChooseMode { .. })
    }
}

#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct ErrorBody {
    pub code: &'static str,
    pub error_msg: String,
}

#[derive(Serialize, Clone, PartialEq, Debug)]
#[serde(untagged)]
pub enum Outcome {
    State(Payload),
    Exception(ErrorBody),
}

/// The reply to every command.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Envelope {
    /// The state name, or `exception`.
    pub command: String,
    pub mode: Option<Mode>,
    pub result: Outcome,
}

impl Envelope {
    pub fn is_exception(&self) -> bool {
        matches!(self.result, Outcome::Exception(_))
    }
}

/// Applies commands to one owner's session and persists the result.
///
/// Every command runs against a copy of the session, which replaces the
/// live one only once it has been saved. The stored session is re-read first,
/// so changes made by other processes (such as removing a card) are seen.
pub struct SessionController<S: Store> {
    store: S,
    machine: SessionStateMachine,
}

impl<S: Store> SessionController<S> {
    /// Loads the owner's session, creating it if there is none.
    pub fn open(mut store: S, owner: OwnerId, now: Timestamp) -> Fallible<Self> {
        let machine = match store.load_session(&owner)? {
            Some(record) => {
                log::debug!("Resuming session for {owner}.");
                SessionStateMachine::resume(record, &store)?
            }
            None => {
                log::debug!("Creating session for {owner}.");
                let machine = SessionStateMachine::new(owner, now);
                store.save_session(&machine.to_record())?;
                machine
            }
        };
        Ok(Self { store, machine })
    }

    pub fn machine(&self) -> &SessionStateMachine {
        &self.machine
    }

    pub fn current(&self) -> Envelope {
        envelope(&self.machine)
    }

    /// Like `current`, but re-reads the stored session first.
    pub fn show(&mut self) -> Envelope {
        match self.refresh() {
            Ok(()) => self.current(),
            Err(e) => self.persistence_failure(e),
        }
    }

    /// Replaces the live session with the stored one when they differ.
    pub fn refresh(&mut self) -> Fallible<()> {
        let owner = self.machine.owner().clone();
        if let Some(record) = self.store.load_session(&owner)? {
            if record != self.machine.to_record() {
                log::debug!("Session for {owner} changed in the store, reloading.");
                self.machine = SessionStateMachine::resume(record, &self.store)?;
            }
        }
        Ok(())
    }

    /// Parses and executes a JSON command.
    pub fn handle(&mut self, value: &Value, now: Timestamp) -> Envelope {
        match Command::parse(value) {
            Ok(command) => self.execute(command, now),
            Err(e) => self.exception(e),
        }
    }

    pub fn execute(&mut self, command: Command, now: Timestamp) -> Envelope {
        if let Err(e) = self.refresh() {
            return self.persistence_failure(e);
        }
        let mut next = if self.machine.is_finished() && command.restarts() {
            log::debug!("Restarting finished session for {}.", self.machine.owner());
            self.machine.restart(now)
        } else {
            self.machine.clone()
        };
        let stored = match apply(&mut next, &mut self.store, command, now) {
            Ok(stored) => stored,
            Err(e) => return self.exception(e),
        };
        if !stored {
            if let Err(e) = self.store.save_session(&next.to_record()) {
                return self.persistence_failure(e);
            }
        }
        self.machine = next;
        self.current()
    }

    fn persistence_failure(&self, error: ErrorReport) -> Envelope {
        log::error!("Session storage failed for {}: {error}", self.machine.owner());
        self.exception(SessionError::persistence(error))
    }

    fn exception(&self, error: SessionError) -> Envelope {
        log::debug!(
            "Session {} rejected command: {} ({})",
            self.machine.owner(),
            error,
            error.code()
        );
        Envelope {
            command: "exception".to_string(),
            mode: self.machine.mode(),
            result: Outcome::Exception(ErrorBody {
                code: error.code(),
                error_msg: error.to_string(),
            }),
        }
    }
}

/// Runs one command. Returns whether the command already stored the session.
fn apply<S: Store>(
    machine: &mut SessionStateMachine,
    store: &mut S,
    command: Command,
    now: Timestamp,
) -> Result<bool, SessionError> {
    match command {
        Command::Start => machine.start(&*store, now)?,
        Command::ChooseMode { mode } => machine.set_mode(&mode)?,
        Command::Answer { answer } => machine.answer_card(&answer)?,
        Command::ReviewAnswer => machine.review()?,
        Command::Next => machine.next(&*store, now)?,
        Command::Prev => machine.prev(&*store, now)?,
        Command::RateQuality { rating } => {
            machine.rate_quality(store, rating, now)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn envelope(machine: &SessionStateMachine) -> Envelope {
    Envelope {
        command: machine.state().as_str().to_string(),
        mode: machine.mode(),
        result: Outcome::State(render(machine)),
    }
}
