//! Identity resolution for conversation rows
//!
//! The backing platform can mint a new thread id for an existing contact,
//! so the participant id is the true dedup key. `resolve` keeps at most one
//! row per participant: the one with the newest `last_message_time`, ties
//! broken by the lexicographically greatest conversation id (deterministic
//! but arbitrary). Rows without a participant id pass through unmodified;
//! absence of identity is not evidence of sameness.
//!
//! Pure, no side effects, idempotent: `resolve(resolve(x)) == resolve(x)`.

use std::collections::HashMap;

use crate::ids::{ConversationId, ParticipantId};
use crate::types::Conversation;

/// Outcome of a resolution pass: the surviving rows (input order preserved,
/// with each group's winner at the group's first position) and the ids of
/// discarded rows.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub kept: Vec<Conversation>,
    pub dropped: Vec<ConversationId>,
}

/// Returns true when `challenger` should replace `incumbent` within a
/// participant group.
fn wins(challenger: &Conversation, incumbent: &Conversation) -> bool {
    match challenger.last_message_time.cmp(&incumbent.last_message_time) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => challenger.id > incumbent.id,
    }
}

/// Deduplicate rows by participant, recording which ids were discarded.
pub fn resolve_with_dropped(rows: Vec<Conversation>) -> Resolution {
    let mut kept: Vec<Conversation> = Vec::with_capacity(rows.len());
    let mut dropped: Vec<ConversationId> = Vec::new();
    // participant -> index of that group's current winner in `kept`
    let mut winners: HashMap<ParticipantId, usize> = HashMap::new();

    for row in rows {
        let Some(participant) = row.participant_id.clone() else {
            kept.push(row);
            continue;
        };

        match winners.get(&participant) {
            None => {
                winners.insert(participant, kept.len());
                kept.push(row);
            }
            Some(&idx) => {
                if wins(&row, &kept[idx]) {
                    if kept[idx].id != row.id {
                        dropped.push(kept[idx].id.clone());
                    }
                    kept[idx] = row;
                } else if kept[idx].id != row.id {
                    dropped.push(row.id);
                }
            }
        }
    }

    Resolution { kept, dropped }
}

/// Deduplicate rows by participant, keeping each group's winner.
pub fn resolve(rows: Vec<Conversation>) -> Vec<Conversation> {
    resolve_with_dropped(rows).kept
}
