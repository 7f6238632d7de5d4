//! Tracked items (desired state) and project board items (observed state)

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Labels matching any of these words mark an item as wanting discussion
const DISCUSSION_LABEL_WORDS: [&str; 3] = ["decision", "help", "discussion"];

/// Login used when GitHub reports no author (deleted accounts)
pub const GHOST_LOGIN: &str = "ghost";

/// What kind of GitHub object an item is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    PullRequest,
    Discussion,
}

/// The account behind an item or comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
    /// GitHub reports the account as a Bot
    pub is_bot: bool,
}

impl Actor {
    pub fn new(login: impl Into<String>, is_bot: bool) -> Self {
        Self {
            login: login.into(),
            is_bot,
        }
    }

    pub fn ghost() -> Self {
        Self::new(GHOST_LOGIN, false)
    }
}

/// Who made the most recent contribution, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// An issue, pull request or discussion returned by search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedItem {
    /// GraphQL node ID; the key shared with the project board
    pub node_id: String,
    pub kind: ItemKind,
    pub url: String,
    pub number: u64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub author: Actor,
    /// Comments plus, for discussions, replies to comments
    pub total_comments: u64,
    /// Thumbs-up reactions
    pub votes: u64,
    pub labels: Vec<String>,
    /// Latest comment, or the author at creation time if there are none
    pub final_comment: Activity,
    pub discussion_wanted: bool,
}

impl TrackedItem {
    /// Discussions cannot be linked to a project, so they go on as drafts
    pub fn use_draft(&self) -> bool {
        self.kind == ItemKind::Discussion
    }

    /// Fold discussion reply threads into the comment statistics
    ///
    /// `reply_count` is the number of replies across all comment threads;
    /// `latest_replies` holds the newest reply of each thread. The newest of
    /// those replaces the final comment when it is more recent.
    pub fn roll_up_replies(
        &mut self,
        reply_count: u64,
        latest_replies: impl IntoIterator<Item = Activity>,
    ) {
        self.total_comments += reply_count;

        let newest = latest_replies.into_iter().max_by_key(|a| a.at);
        if let Some(reply) = newest {
            if reply.at > self.final_comment.at {
                // Reply authors are never reported as bots
                self.final_comment = Activity {
                    actor: Actor::new(reply.actor.login, false),
                    at: reply.at,
                };
            }
        }
    }
}

/// Back-fill the final comment from the author when there are no comments
pub fn final_activity(last_comment: Option<Activity>, author: &Actor, created_at: DateTime<Utc>) -> Activity {
    last_comment.unwrap_or_else(|| Activity {
        actor: author.clone(),
        at: created_at,
    })
}

/// Whether any label asks for a decision, help or discussion
pub fn labels_want_discussion<S: AsRef<str>>(labels: &[S]) -> bool {
    labels.iter().any(|label| {
        let label = label.as_ref().to_lowercase();
        DISCUSSION_LABEL_WORDS.iter().any(|word| label.contains(word))
    })
}

/// Membership category shown on the board for authors and commenters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Peloton,
    Bot,
    External,
}

/// Logins that decide an actor's membership
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: HashSet<String>,
    bot_overrides: HashSet<String>,
}

impl Roster {
    pub fn new(
        members: impl IntoIterator<Item = String>,
        bot_overrides: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            members: members.into_iter().collect(),
            bot_overrides: bot_overrides.into_iter().collect(),
        }
    }

    pub fn is_member(&self, login: &str) -> bool {
        self.members.contains(login)
    }

    /// Number of team members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Team members first, then bots, everyone else is external
    pub fn categorise(&self, actor: &Actor) -> Membership {
        if self.is_member(&actor.login) {
            Membership::Peloton
        } else if actor.is_bot || self.bot_overrides.contains(&actor.login) {
            Membership::Bot
        } else {
            Membership::External
        }
    }
}

/// Item attributes that can be written to project fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    CreatedAt,
    UpdatedAt,
    ClosedAt,
    FinalCommentLogin,
    FinalCommentTime,
    TotalComments,
    AuthorLogin,
    Votes,
    AuthorMembership,
    CommenterMembership,
    DiscussionWanted,
}

/// An item already on the project board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectItem {
    /// Project item ID
    pub id: String,
    /// Node ID of the issue/PR/discussion this item stands for
    pub linked_id: Option<String>,
    pub date_updated: Option<NaiveDate>,
    pub final_comment_date: Option<NaiveDate>,
    pub num_comments: Option<f64>,
}
