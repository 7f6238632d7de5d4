//! Reconciliation between search results and the project board
//!
//! Search results are the desired state; the board is the observed state.
//! Items are matched on the board's link field, which holds the node ID of
//! the issue/PR/discussion. The link field works for drafts too, which is
//! why it is used rather than the board's native content link.
//!
//! Board dates only have day precision, so all date comparisons are made on
//! days.

use std::collections::{HashMap, HashSet};

use crate::item::{ProjectItem, TrackedItem};

/// Which kind of pass is being planned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Everything the search matches; the board is pruned to match
    Full,
    /// Only items updated since the previous pass. Pruning would remove
    /// almost everything, so it is skipped.
    Incremental,
}

/// What a single pass needs to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Project item IDs to delete from the board
    pub remove: Vec<String>,
    /// Project item IDs whose next-Peloton-date must be cleared
    pub clear_next_date: Vec<String>,
    /// Node IDs of issues/PRs to add as linked items
    pub add_linked: Vec<String>,
    /// Node IDs of discussions to add as drafts
    pub add_drafts: Vec<String>,
    /// Node IDs whose board fields must be rewritten
    pub update: Vec<String>,
    /// Node ID to project item ID for tracked items already on the board
    pub on_board: HashMap<String, String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
            && self.clear_next_date.is_empty()
            && self.add_linked.is_empty()
            && self.add_drafts.is_empty()
            && self.update.is_empty()
    }
}

/// Whether the board's comment statistics are stale
///
/// Both the count and the final comment date are checked so that deleted
/// comments are noticed too.
fn has_new_comments(board: &ProjectItem, item: &TrackedItem) -> bool {
    board.num_comments != Some(item.total_comments as f64)
        || board.final_comment_date != Some(item.final_comment.at.date_naive())
}

fn is_updated(board: &ProjectItem, item: &TrackedItem) -> bool {
    board.date_updated != Some(item.updated_at.date_naive())
}

/// Plan one pass over the board
pub fn plan(board: &[ProjectItem], tracked: &[TrackedItem], mode: SyncMode) -> SyncPlan {
    let mut result = SyncPlan::default();

    // First board item per linked ID; any further ones are duplicates
    let mut by_link: HashMap<&str, &ProjectItem> = HashMap::new();
    let mut duplicates = Vec::new();
    for item in board {
        if let Some(link) = item.linked_id.as_deref() {
            if by_link.contains_key(link) {
                duplicates.push(item.id.clone());
            } else {
                by_link.insert(link, item);
            }
        }
    }

    if mode == SyncMode::Full {
        let wanted: HashSet<&str> = tracked.iter().map(|t| t.node_id.as_str()).collect();
        for item in board {
            let orphaned = match item.linked_id.as_deref() {
                None => true,
                Some(link) => !wanted.contains(link),
            };
            if orphaned {
                result.remove.push(item.id.clone());
            }
        }
        // Duplicates of an orphaned link are already queued
        let queued: HashSet<String> = result.remove.iter().cloned().collect();
        result
            .remove
            .extend(duplicates.into_iter().filter(|id| !queued.contains(id)));
    }

    for item in tracked {
        match by_link.get(item.node_id.as_str()) {
            Some(board_item) => {
                result
                    .on_board
                    .insert(item.node_id.clone(), board_item.id.clone());

                let new_comments = has_new_comments(board_item, item);
                if new_comments {
                    result.clear_next_date.push(board_item.id.clone());
                }

                let needs_update = match mode {
                    SyncMode::Incremental => true,
                    SyncMode::Full => new_comments || is_updated(board_item, item),
                };
                if needs_update {
                    result.update.push(item.node_id.clone());
                }
            }
            None => {
                if item.use_draft() {
                    result.add_drafts.push(item.node_id.clone());
                } else {
                    result.add_linked.push(item.node_id.clone());
                }
                result.update.push(item.node_id.clone());
            }
        }
    }

    result
}
