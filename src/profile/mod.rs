//! Profile data model: the persisted profile, its registration draft, and
//! the value types both are built from.

pub mod model;

pub use model::{
    EditableField, Gender, Location, NewProfile, PhotoRef, Profile, ProfileDraft, UserId,
};
