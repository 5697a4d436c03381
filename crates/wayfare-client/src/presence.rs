//! Room presence — who else is here and what are they touching.
//!
//! The registry is the local mirror of remote membership plus the soft
//! edit-lock map. Everything here is advisory UI state: a lock never blocks
//! a local edit, and presence events are best-effort — a missed or stale
//! event is corrected by the next roster snapshot, never treated as an
//! error.
//!
//! Color tokens are positional: each user gets the palette entry at their
//! roster index (modulo palette size), so colors reshuffle whenever the
//! roster is refetched. That is expected behavior, not churn to suppress.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wayfare_types::{CardId, ColorToken, EditLock, EditingUser, UserId, UserInfo};

/// One remote user present in the room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
    pub color: ColorToken,
}

/// Local mirror of room membership and soft edit locks.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Roster order == color assignment order.
    users: Vec<Participant>,
    editing: HashMap<CardId, EditingUser>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Replace the whole roster with an authoritative snapshot.
    ///
    /// Edit locks held by users no longer present are dropped; surviving
    /// locks pick up their holder's new color.
    pub fn apply_roster(&mut self, users: Vec<UserInfo>) {
        self.users = users
            .into_iter()
            .enumerate()
            .map(|(i, u)| Participant {
                id: u.id,
                name: u.name,
                color: ColorToken::from_index(i),
            })
            .collect();

        self.editing.retain(|card_id, editor| {
            match self.users.iter().find(|p| p.id == editor.user_id) {
                Some(holder) => {
                    editor.color = holder.color;
                    true
                }
                None => {
                    debug!(card = %card_id.short(), "dropping edit lock of departed user");
                    false
                }
            }
        });
    }

    /// A user entered the room. Joining twice refreshes the name only.
    pub fn user_joined(&mut self, user: UserInfo) {
        if let Some(existing) = self.users.iter_mut().find(|p| p.id == user.id) {
            existing.name = user.name;
            return;
        }
        let color = ColorToken::from_index(self.users.len());
        self.users.push(Participant { id: user.id, name: user.name, color });
    }

    /// A user left. Clears their edit locks so no indicator sticks around
    /// pointing at a ghost.
    pub fn user_left(&mut self, user_id: UserId) {
        self.users.retain(|p| p.id != user_id);
        self.editing.retain(|_, editor| editor.user_id != user_id);
    }

    // =========================================================================
    // Soft edit locks
    // =========================================================================

    /// A remote user started editing a card. Last start wins — a newer
    /// lock replaces an older one on the same card.
    pub fn start_editing(&mut self, card_id: CardId, user: UserInfo) {
        let Some(holder) = self.users.iter().find(|p| p.id == user.id) else {
            // Event raced ahead of the roster; the next users:list will
            // carry both the user and (via a fresh start) the lock.
            warn!(card = %card_id.short(), user = %user.id.short(),
                  "editing event from user not in roster, ignoring");
            return;
        };
        let color = holder.color;
        self.editing.insert(
            card_id,
            EditingUser { user_id: user.id, name: user.name, color },
        );
    }

    /// A remote user stopped editing. A stale end from a user who no
    /// longer holds the lock must not clobber the newer holder — no-op.
    pub fn end_editing(&mut self, card_id: CardId, user_id: UserId) {
        if self.editing.get(&card_id).is_some_and(|e| e.user_id == user_id) {
            self.editing.remove(&card_id);
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Remote users in roster (color) order.
    pub fn participants(&self) -> &[Participant] {
        &self.users
    }

    /// Who is editing `card_id`, if anyone.
    pub fn editing_user(&self, card_id: CardId) -> Option<&EditingUser> {
        self.editing.get(&card_id)
    }

    /// All current soft locks, for the UI layer.
    pub fn edit_locks(&self) -> Vec<EditLock> {
        self.editing
            .iter()
            .map(|(&card_id, editor)| EditLock { card_id, editor: editor.clone() })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
