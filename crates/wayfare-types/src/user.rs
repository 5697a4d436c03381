//! Roster user types and presence color tokens.
//!
//! A `UserInfo` is what the backend sends in roster events — identity plus a
//! display name. Color tokens are assigned locally by roster position, so a
//! user's color can change whenever the roster is refetched; that is expected
//! behavior, not state to preserve across reconnects.

use serde::{Deserialize, Serialize};
use strum::VariantArray;

use crate::ids::{CardId, UserId};

/// A user as reported by roster events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
}

impl UserInfo {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Presence accent color, assigned by roster index modulo the palette.
///
/// The UI maps each token to its theme's concrete color value.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash,
    Serialize, Deserialize, strum::Display, strum::EnumString, VariantArray,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ColorToken {
    Coral,
    Amber,
    Lime,
    Teal,
    Sky,
    Violet,
    Magenta,
    Slate,
}

impl ColorToken {
    /// Token for the user at `index` in the current roster.
    pub fn from_index(index: usize) -> Self {
        Self::VARIANTS[index % Self::VARIANTS.len()]
    }
}

/// Who currently holds the soft edit lock on a card.
///
/// Advisory only — the UI dims or outlines the card; nothing blocks a local
/// edit of a card another user is touching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditingUser {
    pub user_id: UserId,
    pub name: String,
    pub color: ColorToken,
}

/// A card edit-lock pair, as exposed to the UI layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLock {
    pub card_id: CardId,
    pub editor: EditingUser,
}

// ============================================================================
// Tests
// ============================================================================
