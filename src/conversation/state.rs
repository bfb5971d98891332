//! Conversation states: tracks which input a user's session expects next.

use serde::{Deserialize, Serialize};

use crate::profile::UserId;

/// The states of one user's conversation.
///
/// Registration progresses linearly: Start → Gender → Age → Hobby →
/// Location → Photo → Description → Menu. From Menu the user either enters
/// the swipe loop (Matching) or the edit flow (EditChoice → EditDescription
/// / EditHobby → Menu). Cancel ends the session from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Start,
    Gender,
    Age,
    Hobby,
    Location,
    Photo,
    Description,
    Menu,
    /// Swipe loop; `candidate` is the profile currently on screen.
    Matching {
        candidate: UserId,
    },
    EditChoice,
    EditDescription,
    EditHobby,
    End,
}

/// Which flow a state belongs to. Registration and editing share the
/// free-text input shape but never share states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Registering,
    Editing,
}

impl ConversationState {
    /// Check if a transition from `self` to `target` is legal.
    ///
    /// Staying in the same state (a re-prompt) is not a transition and is
    /// not covered here.
    pub fn can_transition_to(&self, target: ConversationState) -> bool {
        use ConversationState::*;
        // Cancel and the entry command are accepted everywhere.
        if matches!(target, End | Gender | Menu) {
            return true;
        }
        matches!(
            (self, target),
            (Start, Gender)
                | (Gender, Age)
                | (Age, Hobby)
                | (Hobby, Location)
                | (Location, Photo)
                | (Photo, Description)
                | (Menu, Matching { .. })
                | (Matching { .. }, Matching { .. })
                | (Menu, EditChoice)
                | (EditChoice, EditDescription)
                | (EditChoice, EditHobby)
        )
    }

    /// Whether this state is terminal (the session is over until `/start`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// The flow the state belongs to, if any.
    pub fn mode(&self) -> Option<Mode> {
        use ConversationState::*;
        match self {
            Gender | Age | Hobby | Location | Photo | Description => Some(Mode::Registering),
            EditChoice | EditDescription | EditHobby => Some(Mode::Editing),
            Start | Menu | Matching { .. } | End => None,
        }
    }

    /// Next registration step, if `self` is one.
    pub fn next_registration_step(&self) -> Option<ConversationState> {
        use ConversationState::*;
        match self {
            Start => Some(Gender),
            Gender => Some(Age),
            Age => Some(Hobby),
            Hobby => Some(Location),
            Location => Some(Photo),
            Photo => Some(Description),
            Description => Some(Menu),
            _ => None,
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::Start
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Gender => "gender",
            Self::Age => "age",
            Self::Hobby => "hobby",
            Self::Location => "location",
            Self::Photo => "photo",
            Self::Description => "description",
            Self::Menu => "menu",
            Self::Matching { .. } => "matching",
            Self::EditChoice => "edit_choice",
            Self::EditDescription => "edit_description",
            Self::EditHobby => "edit_hobby",
            Self::End => "end",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRATION: [ConversationState; 8] = [
        ConversationState::Start,
        ConversationState::Gender,
        ConversationState::Age,
        ConversationState::Hobby,
        ConversationState::Location,
        ConversationState::Photo,
        ConversationState::Description,
        ConversationState::Menu,
    ];

    #[test]
    fn valid_transitions() {
        use ConversationState::*;
        let candidate = Matching {
            candidate: UserId(9),
        };
        let transitions = [
            (Start, Gender),
            (Gender, Age),
            (Age, Hobby),
            (Hobby, Location),
            (Location, Photo),
            (Photo, Description),
            (Description, Menu),
            (Menu, candidate),
            (candidate, Matching { candidate: UserId(10) }),
            (candidate, Menu),
            (Menu, EditChoice),
            (EditChoice, EditDescription),
            (EditChoice, EditHobby),
            (EditChoice, Menu),
            (EditDescription, Menu),
            (EditHobby, Menu),
        ];
        for (from, to) in transitions {
            assert!(
                from.can_transition_to(to),
                "{from} should transition to {to}"
            );
        }
    }

    #[test]
    fn invalid_transitions() {
        use ConversationState::*;
        // Skip steps
        assert!(!Gender.can_transition_to(Hobby));
        assert!(!Age.can_transition_to(Description));
        // Go backward
        assert!(!Hobby.can_transition_to(Age));
        // Matching only from Menu or itself
        assert!(!Description.can_transition_to(Matching { candidate: UserId(1) }));
        assert!(!EditChoice.can_transition_to(Matching { candidate: UserId(1) }));
        // Editing only from Menu
        assert!(!Photo.can_transition_to(EditChoice));
        assert!(!EditHobby.can_transition_to(EditDescription));
        assert!(!End.can_transition_to(Age));
    }

    #[test]
    fn cancel_and_restart_allowed_everywhere() {
        use ConversationState::*;
        let states = [
            Start,
            Gender,
            Age,
            Hobby,
            Location,
            Photo,
            Description,
            Menu,
            Matching { candidate: UserId(3) },
            EditChoice,
            EditDescription,
            EditHobby,
            End,
        ];
        for state in states {
            assert!(state.can_transition_to(End), "{state} → end");
            assert!(state.can_transition_to(Gender), "{state} → gender");
            assert!(state.can_transition_to(Menu), "{state} → menu");
        }
    }

    #[test]
    fn is_terminal() {
        use ConversationState::*;
        assert!(End.is_terminal());
        assert!(!Start.is_terminal());
        assert!(!Menu.is_terminal());
    }

    #[test]
    fn modes_do_not_overlap() {
        use ConversationState::*;
        assert_eq!(Hobby.mode(), Some(Mode::Registering));
        assert_eq!(Description.mode(), Some(Mode::Registering));
        assert_eq!(EditHobby.mode(), Some(Mode::Editing));
        assert_eq!(EditDescription.mode(), Some(Mode::Editing));
        assert_eq!(Menu.mode(), None);
        assert_eq!(Matching { candidate: UserId(1) }.mode(), None);
    }

    #[test]
    fn next_walks_registration() {
        let mut current = ConversationState::Start;
        for expected in &REGISTRATION[1..] {
            let next = current.next_registration_step().unwrap();
            assert_eq!(next, *expected);
            assert!(current.can_transition_to(next));
            current = next;
        }
        assert!(current.next_registration_step().is_none());
    }

    #[test]
    fn display_matches_serde_for_unit_states() {
        for state in REGISTRATION {
            let display = format!("{state}");
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(format!("\"{display}\""), json, "{state:?}");
        }
    }
}
