//! The per-user state machine that drives
//! registration, the main menu, the swipe loop, and profile edits.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::AgeBounds;
use crate::error::DatabaseError;
use crate::matching::{CandidateSelector, MatchDetector, MatchOutcome};
use crate::profile::{EditableField, Gender, UserId};
use crate::store::{DecisionStore, ProfileStore, SwipeAction};

use super::input::{EditChoice, InboundEvent, Input, MenuChoice, Sender};
use super::outbound::OutboundMessage;
use super::prompts;
use super::session::{Session, SessionManager};
use super::state::ConversationState;

/// What a state did with an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Input accepted; the session may have moved on.
    Done,
    /// Input didn't match the expected shape; re-emit the current prompt.
    Reprompt,
    /// Input is dropped without reply.
    Ignore,
}

/// Routes each inbound event through the sender's session.
///
/// Events for one user are handled strictly one at a time (the session
/// lease); different users proceed concurrently and meet only in the stores.
pub struct ConversationEngine {
    profiles: Arc<dyn ProfileStore>,
    selector: CandidateSelector,
    detector: MatchDetector,
    sessions: SessionManager,
    age_bounds: AgeBounds,
}

impl ConversationEngine {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        decisions: Arc<dyn DecisionStore>,
        age_bounds: AgeBounds,
    ) -> Self {
        Self {
            selector: CandidateSelector::new(Arc::clone(&profiles), Arc::clone(&decisions)),
            detector: MatchDetector::new(decisions),
            profiles,
            sessions: SessionManager::new(),
            age_bounds,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Current state of a user's session.
    pub fn state_of(&self, user_id: UserId) -> ConversationState {
        self.sessions.state(user_id)
    }

    /// Handle one event and return the messages to deliver, in order.
    ///
    /// Messages may be addressed to users other than the sender (a match
    /// notifies both sides). Store failures never propagate: the sender is
    /// told to retry and the session keeps its pre-event state.
    pub async fn handle(&self, sender: &Sender, event: InboundEvent) -> Vec<OutboundMessage> {
        let user_id = sender.user_id;
        let input = Input::classify(&event);
        let mut lease = self.sessions.checkout(user_id).await;
        let from = lease.session().state;
        let mut out = Vec::new();

        let step = self
            .step(sender, lease.session_mut(), &input, &mut out)
            .await;

        match step {
            Ok(Step::Done) => {
                let to = lease.session().state;
                if to != from {
                    debug_assert!(from.can_transition_to(to), "illegal transition {from} → {to}");
                    debug!(
                        user_id = %user_id,
                        from = %from,
                        to = %to,
                        mode = ?to.mode(),
                        "State transition"
                    );
                }
                lease.commit();
            }
            Ok(Step::Reprompt) => {
                debug!(user_id = %user_id, state = %from, input = event.kind(), "Input rejected, re-prompting");
                out.push(prompts::reprompt(user_id, from, self.age_bounds));
            }
            Ok(Step::Ignore) => {}
            Err(e) => {
                if e.is_unavailable() {
                    warn!(user_id = %user_id, state = %from, error = %e, "Store unavailable; session left unchanged");
                } else {
                    error!(user_id = %user_id, state = %from, error = %e, "Unexpected store error");
                }
                out.push(prompts::plain(user_id, prompts::STORE_UNAVAILABLE));
            }
        }

        out
    }

    async fn step(
        &self,
        sender: &Sender,
        session: &mut Session,
        input: &Input,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<Step, DatabaseError> {
        let user_id = sender.user_id;

        // Commands are accepted in every state.
        match input {
            Input::Start => return self.start(sender, session, out).await,
            Input::Cancel => {
                session.reset_to(ConversationState::End);
                out.push(prompts::cancelled(user_id));
                return Ok(Step::Done);
            }
            Input::UnknownCommand(name) => {
                debug!(user_id = %user_id, command = %name, "Unknown command");
                out.push(prompts::unknown_command(user_id));
                return Ok(Step::Ignore);
            }
            Input::Malformed(e) => {
                warn!(user_id = %user_id, error = %e, "Ignoring malformed input");
                return Ok(Step::Ignore);
            }
            _ => {}
        }

        match session.state {
            ConversationState::Start | ConversationState::End => Ok(Step::Reprompt),

            ConversationState::Gender => {
                let Some(gender) = input.as_text().and_then(Gender::from_label) else {
                    return Ok(Step::Reprompt);
                };
                session.draft.gender = Some(gender);
                session.state = ConversationState::Age;
                out.push(prompts::ask_age(user_id));
                Ok(Step::Done)
            }

            ConversationState::Age => {
                let Some(age) = input.as_text().and_then(|t| self.parse_age(t)) else {
                    return Ok(Step::Reprompt);
                };
                session.draft.age = Some(age);
                session.state = ConversationState::Hobby;
                out.push(prompts::ask_hobby(user_id));
                Ok(Step::Done)
            }

            ConversationState::Hobby => {
                let Some(hobby) = non_blank(input) else {
                    return Ok(Step::Reprompt);
                };
                session.draft.hobby = Some(hobby);
                session.state = ConversationState::Location;
                out.push(prompts::ask_location(user_id));
                Ok(Step::Done)
            }

            ConversationState::Location => {
                let Input::Location(location) = input else {
                    return Ok(Step::Reprompt);
                };
                session.draft.location = Some(*location);
                session.state = ConversationState::Photo;
                out.push(prompts::ask_photo(user_id));
                Ok(Step::Done)
            }

            ConversationState::Photo => {
                let Input::Photo(photo) = input else {
                    return Ok(Step::Reprompt);
                };
                session.draft.photo_ref = Some(photo.clone());
                session.state = ConversationState::Description;
                out.push(prompts::ask_description(user_id));
                Ok(Step::Done)
            }

            ConversationState::Description => {
                let Some(description) = non_blank(input) else {
                    return Ok(Step::Reprompt);
                };
                session.draft.description = Some(description);
                self.register(user_id, session, out).await
            }

            ConversationState::Menu => match input {
                Input::Menu(MenuChoice::FindMatch) => {
                    self.offer_next(user_id, session, out).await?;
                    Ok(Step::Done)
                }
                Input::Menu(MenuChoice::ViewProfile) => {
                    match self.profiles.get(user_id).await {
                        Ok(profile) => out.push(prompts::own_profile(user_id, &profile)),
                        Err(DatabaseError::NotFound { .. }) => {
                            out.push(prompts::plain(user_id, prompts::PROFILE_NOT_FOUND));
                        }
                        Err(e) => return Err(e),
                    }
                    Ok(Step::Done)
                }
                Input::Menu(MenuChoice::EditProfile) => {
                    session.state = ConversationState::EditChoice;
                    out.push(prompts::edit_menu(user_id));
                    Ok(Step::Done)
                }
                _ => Ok(Step::Reprompt),
            },

            ConversationState::Matching { .. } => match input {
                Input::Swipe { action, target } => {
                    self.swipe(user_id, *action, *target, session, out).await
                }
                _ => Ok(Step::Reprompt),
            },

            ConversationState::EditChoice => match input {
                Input::Edit(EditChoice::Description) => {
                    session.state = ConversationState::EditDescription;
                    out.push(prompts::ask_new_description(user_id));
                    Ok(Step::Done)
                }
                Input::Edit(EditChoice::Hobby) => {
                    session.state = ConversationState::EditHobby;
                    out.push(prompts::ask_new_hobby(user_id));
                    Ok(Step::Done)
                }
                Input::Edit(EditChoice::Cancel) => {
                    session.state = ConversationState::Menu;
                    out.push(prompts::edit_cancelled(user_id));
                    Ok(Step::Done)
                }
                _ => Ok(Step::Reprompt),
            },

            ConversationState::EditDescription => {
                self.edit(user_id, EditableField::Description, session, input, out)
                    .await
            }
            ConversationState::EditHobby => {
                self.edit(user_id, EditableField::Hobby, session, input, out)
                    .await
            }
        }
    }

    /// Entry command: registered users go to the menu, everyone else starts
    /// registration. Any draft in progress is dropped either way.
    async fn start(
        &self,
        sender: &Sender,
        session: &mut Session,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<Step, DatabaseError> {
        let user_id = sender.user_id;
        if self.profiles.exists(user_id).await? {
            session.reset_to(ConversationState::Menu);
            out.push(prompts::welcome_back(user_id));
        } else {
            session.reset_to(ConversationState::Gender);
            out.push(prompts::welcome_new(user_id, sender.display_name.as_deref()));
        }
        Ok(Step::Done)
    }

    fn parse_age(&self, text: &str) -> Option<u8> {
        let age: i64 = text.trim().parse().ok()?;
        if !self.age_bounds.contains(age) {
            return None;
        }
        u8::try_from(age).ok()
    }

    /// Commit the finished draft as a profile.
    async fn register(
        &self,
        user_id: UserId,
        session: &mut Session,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<Step, DatabaseError> {
        let new_profile = match session.draft.clone().complete(user_id) {
            Ok(p) => p,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Registration draft incomplete");
                session.reset_to(ConversationState::End);
                out.push(prompts::plain(user_id, prompts::SAVE_FAILED));
                return Ok(Step::Done);
            }
        };

        match self.profiles.create(&new_profile).await {
            Ok(profile) => {
                info!(user_id = %user_id, gender = %profile.gender, age = profile.age, "User registered");
                session.reset_to(ConversationState::Menu);
                out.push(prompts::registered(user_id));
            }
            Err(DatabaseError::DuplicateProfile { .. }) => {
                warn!(user_id = %user_id, "Registration for an existing profile");
                session.reset_to(ConversationState::End);
                out.push(prompts::already_registered(user_id));
            }
            Err(e @ DatabaseError::IncompleteProfile { .. }) => {
                warn!(user_id = %user_id, error = %e, "Profile rejected by store");
                session.reset_to(ConversationState::End);
                out.push(prompts::plain(user_id, prompts::SAVE_FAILED));
            }
            Err(e) => return Err(e),
        }
        Ok(Step::Done)
    }

    /// Show the next candidate, or report exhaustion and return to the menu.
    async fn offer_next(
        &self,
        user_id: UserId,
        session: &mut Session,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<(), DatabaseError> {
        match self.selector.next_candidate(user_id).await? {
            Some(candidate) => {
                session.state = ConversationState::Matching {
                    candidate: candidate.user_id,
                };
                out.push(prompts::candidate_card(user_id, &candidate));
            }
            None => {
                debug!(user_id = %user_id, "No candidates left");
                session.state = ConversationState::Menu;
                out.push(prompts::exhausted(user_id));
            }
        }
        Ok(())
    }

    /// Record a decision, notify on a match, and keep the loop going.
    async fn swipe(
        &self,
        user_id: UserId,
        action: SwipeAction,
        target: UserId,
        session: &mut Session,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<Step, DatabaseError> {
        // Tokens from older cards are fine as long as they name a real profile.
        if target == user_id || !self.profiles.exists(target).await? {
            warn!(user_id = %user_id, target = %target, "Ignoring swipe token for invalid target");
            return Ok(Step::Ignore);
        }

        match self.detector.apply_decision(user_id, target, action).await? {
            MatchOutcome::Matched => {
                out.push(prompts::decision_ack(user_id, action));
                out.push(prompts::plain(user_id, prompts::MATCH_ANNOUNCEMENT));
                out.push(prompts::plain(target, prompts::MATCH_ANNOUNCEMENT));
            }
            MatchOutcome::NoMatch => out.push(prompts::decision_ack(user_id, action)),
            MatchOutcome::AlreadyDecided => {
                out.push(prompts::plain(user_id, prompts::ALREADY_DECIDED));
            }
        }

        self.offer_next(user_id, session, out).await?;
        Ok(Step::Done)
    }

    async fn edit(
        &self,
        user_id: UserId,
        field: EditableField,
        session: &mut Session,
        input: &Input,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<Step, DatabaseError> {
        let Some(value) = non_blank(input) else {
            return Ok(Step::Reprompt);
        };

        match self.profiles.update_field(user_id, field, &value).await {
            Ok(()) => {
                info!(user_id = %user_id, field = %field, "Profile updated");
                session.state = ConversationState::Menu;
                out.push(match field {
                    EditableField::Description => prompts::description_updated(user_id),
                    EditableField::Hobby => prompts::hobby_updated(user_id),
                });
            }
            Err(DatabaseError::NotFound { .. }) => {
                session.reset_to(ConversationState::End);
                out.push(prompts::plain(user_id, prompts::PROFILE_NOT_FOUND));
            }
            Err(e) => return Err(e),
        }
        Ok(Step::Done)
    }
}

/// Trimmed free text, if the input carries any.
fn non_blank(input: &Input) -> Option<String> {
    input
        .as_text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}
