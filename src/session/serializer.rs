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

use serde::Serialize;

use crate::session::machine::SessionStateMachine;
use crate::types::card::Card;
use crate::types::card::Grammemes;
use crate::types::mode::Mode;
use crate::types::state::SessionState;

/// What a client sees of a session in its current state.
#[derive(Serialize, Clone, PartialEq, Debug)]
#[serde(untagged)]
pub enum Payload {
    ModeChoice(Vec<ModeOption>),
    Card(CardView),
    Empty(Empty),
}

#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct ModeOption {
    pub mode_name: &'static str,
    pub description: &'static str,
    pub is_selected: bool,
}

/// A card as shown to its learner. Carries no owner.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct CardView {
    pub phrase: String,
    pub grammemes: Grammemes,
    pub translation: Option<String>,
}

/// Serializes as `{}`.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Empty {}

type Render = fn(&SessionStateMachine) -> Payload;

fn renderer(state: SessionState) -> Render {
    match state {
        SessionState::ModeChoice => render_mode_choice,
        SessionState::ReviewCard => render_hidden_card,
        SessionState::ReviewAndAnswerCard => render_hidden_card,
        SessionState::ReviewedCard => render_revealed_card,
        SessionState::CorrectlyAnsweredCard => render_revealed_card,
        SessionState::IncorrectlyAnsweredCard => render_revealed_card,
        SessionState::RatedYourAnswerForCard => render_revealed_card,
        SessionState::FinishedReview => render_finished,
        SessionState::FinishedReviewAndAnswer => render_finished,
    }
}

pub fn render(machine: &SessionStateMachine) -> Payload {
    renderer(machine.state())(machine)
}

fn render_mode_choice(machine: &SessionStateMachine) -> Payload {
    let options = Mode::ALL
        .into_iter()
        .map(|mode| ModeOption {
            mode_name: mode.as_str(),
            description: mode.description(),
            is_selected: machine.mode() == Some(mode),
        })
        .collect();
    Payload::ModeChoice(options)
}

fn render_hidden_card(machine: &SessionStateMachine) -> Payload {
    card_payload(machine.current_card(), false)
}

fn render_revealed_card(machine: &SessionStateMachine) -> Payload {
    card_payload(machine.current_card(), true)
}

fn render_finished(_: &SessionStateMachine) -> Payload {
    Payload::Empty(Empty {})
}

/// A card state with no card, as after starting on an empty deck, renders
/// as `{}`.
fn card_payload(card: Option<&Card>, reveal: bool) -> Payload {
    match card {
        Some(card) => Payload::Card(CardView {
            phrase: card.phrase().text.clone(),
            grammemes: card.phrase().grammemes.clone(),
            translation: if reveal {
                card.translation().map(|t| t.text.clone())
            } else {
                None
            },
        }),
        None => Payload::Empty(Empty {}),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::Fallible;
    use crate::store::MemoryStore;
    use crate::types::card::CardId;
    use crate::types::card::OwnerId;
    use crate::types::card::Phrase;
    use crate::types::card::Scheduling;
    use crate::types::timestamp::Timestamp;

    fn store() -> Fallible<MemoryStore> {
        let mut phrase = Phrase::new("заявление", "statement");
        phrase
            .grammemes
            .insert("case".to_string(), "nominative".to_string());
        Ok(MemoryStore::with_cards(vec![Card::new(
            CardId::new(1),
            OwnerId::new("alice"),
            phrase,
            Scheduling::default(),
            Timestamp::parse("2025-01-01T00:00:00Z")?,
        )]))
    }

    fn rendered(machine: &SessionStateMachine) -> Fallible<serde_json::Value> {
        Ok(serde_json::to_value(render(machine))?)
    }

    #[test]
    fn test_mode_choice_lists_modes() -> Fallible<()> {
        let now = Timestamp::parse("2025-06-01T00:00:00Z")?;
        let mut machine = SessionStateMachine::new(OwnerId::new("alice"), now);
        assert_eq!(
            rendered(&machine)?,
            json!([
                {
                    "mode_name": "review_only",
                    "description": Mode::ReviewOnly.description(),
                    "is_selected": false
                },
                {
                    "mode_name": "review_and_answer",
                    "description": Mode::ReviewAndAnswer.description(),
                    "is_selected": false
                }
            ])
        );
        machine.set_mode("review_and_answer")?;
        let value = rendered(&machine)?;
        assert_eq!(value[0]["is_selected"], json!(false));
        assert_eq!(value[1]["is_selected"], json!(true));
        Ok(())
    }

    #[test]
    fn test_translation_hidden_until_answered() -> Fallible<()> {
        let store = store()?;
        let now = Timestamp::parse("2025-06-01T00:00:00Z")?;
        let mut machine = SessionStateMachine::new(OwnerId::new("alice"), now);
        machine.set_mode("review_and_answer")?;
        machine.start(&store, now)?;
        assert_eq!(
            rendered(&machine)?,
            json!({
                "phrase": "заявление",
                "grammemes": {"case": "nominative"},
                "translation": null
            })
        );
        machine.answer_card("Statement ")?;
        assert_eq!(rendered(&machine)?["translation"], json!("statement"));
        Ok(())
    }

    #[test]
    fn test_review_card_never_leaks_translation() -> Fallible<()> {
        let store = store()?;
        let now = Timestamp::parse("2025-06-01T00:00:00Z")?;
        let mut machine = SessionStateMachine::new(OwnerId::new("alice"), now);
        machine.set_mode("review_only")?;
        machine.start(&store, now)?;
        let value = rendered(&machine)?;
        assert_eq!(value["translation"], json!(null));
        assert!(!value.to_string().contains("statement"));
        assert!(!value.to_string().contains("alice"));
        machine.review()?;
        assert_eq!(rendered(&machine)?["translation"], json!("statement"));
        assert!(!rendered(&machine)?.to_string().contains("alice"));
        Ok(())
    }

    #[test]
    fn test_finished_and_cardless_states_are_empty() -> Fallible<()> {
        let store = MemoryStore::new();
        let now = Timestamp::parse("2025-06-01T00:00:00Z")?;
        let mut machine = SessionStateMachine::new(OwnerId::new("alice"), now);
        machine.set_mode("review_only")?;
        machine.start(&store, now)?;
        assert_eq!(rendered(&machine)?, json!({}));
        machine.review()?;
        machine.next(&store, now)?;
        assert_eq!(machine.state(), SessionState::FinishedReview);
        assert_eq!(render(&machine), Payload::Empty(Empty {}));
        assert_eq!(rendered(&machine)?, json!({}));
        Ok(())
    }
}
