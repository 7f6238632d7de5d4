//! Paginated GraphQL queries: board items, board fields, search, team

use chrono::{DateTime, NaiveDate, Utc};
use peloton_core::config::{ProjectConfig, TeamConfig};
use peloton_core::fields::{FieldKind, ProjectField, SelectOption};
use peloton_core::item::{final_activity, labels_want_discussion};
use peloton_core::{Activity, Actor, ItemKind, ProjectItem, TrackedItem};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::graphql::{GraphQLClient, PagedQuery};
use crate::Result;

const PROJECT_ITEMS_QUERY: &str = r#"
query(
  $projectId: ID!, $first: Int!, $after: String,
  $linkedIdField: String!, $dateUpdatedField: String!,
  $finalCommentField: String!, $numCommentsField: String!
) {
  node(id: $projectId) {
    ... on ProjectV2 {
      items(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          id
          linkedId: fieldValueByName(name: $linkedIdField) {
            ... on ProjectV2ItemFieldTextValue { text }
          }
          dateUpdated: fieldValueByName(name: $dateUpdatedField) {
            ... on ProjectV2ItemFieldDateValue { date }
          }
          finalCommentTime: fieldValueByName(name: $finalCommentField) {
            ... on ProjectV2ItemFieldDateValue { date }
          }
          numComments: fieldValueByName(name: $numCommentsField) {
            ... on ProjectV2ItemFieldNumberValue { number }
          }
        }
      }
    }
  }
}
"#;

const PROJECT_FIELDS_QUERY: &str = r#"
query($projectId: ID!, $first: Int!, $after: String) {
  node(id: $projectId) {
    ... on ProjectV2 {
      fields(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          ... on ProjectV2FieldCommon { id name dataType }
          ... on ProjectV2SingleSelectField { options { id name } }
        }
      }
    }
  }
}
"#;

const TEAM_MEMBERS_QUERY: &str = r#"
query($org: String!, $slug: String!, $first: Int!, $after: String) {
  organization(login: $org) {
    team(slug: $slug) {
      members(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes { login }
      }
    }
  }
}
"#;

/// Selection shared by issues, pull requests and discussions
const ITEM_SELECTION: &str = r#"
        id url number title createdAt updatedAt closedAt
        author { login ... on Bot { botId: id } }
        votes: reactions(content: THUMBS_UP) { totalCount }
        labels(first: 100) { nodes { name } }
        comments { totalCount }
        finalComment: comments(last: 1) {
          nodes { createdAt author { login ... on Bot { botId: id } } }
        }
"#;

/// Extra selection for discussions: replies live under each comment
const DISCUSSION_SELECTION: &str = r#"
        discussionComments: comments(first: 100) {
          nodes {
            replies { totalCount }
            finalReply: replies(last: 1) { nodes { createdAt author { login } } }
          }
        }
"#;

/// What a search pass looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    IssuesAndPullRequests,
    Discussions,
}

impl SearchKind {
    fn search_type(self) -> &'static str {
        match self {
            SearchKind::IssuesAndPullRequests => "ISSUE",
            SearchKind::Discussions => "DISCUSSION",
        }
    }

    fn document(self) -> String {
        let fragments = match self {
            SearchKind::IssuesAndPullRequests => format!(
                "... on Issue {{ {item} }}\n      ... on PullRequest {{ {item} }}",
                item = ITEM_SELECTION
            ),
            SearchKind::Discussions => format!(
                "... on Discussion {{ {item} {extra} }}",
                item = ITEM_SELECTION,
                extra = DISCUSSION_SELECTION
            ),
        };

        format!(
            r#"
query($query: String!, $type: SearchType!, $first: Int!, $after: String) {{
  search(query: $query, type: $type, first: $first, after: $after) {{
    pageInfo {{ hasNextPage endCursor }}
    nodes {{
      __typename
      {fragments}
    }}
  }}
}}
"#
        )
    }
}

// Raw response shapes

#[derive(Debug, Deserialize)]
struct TextValue {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateValue {
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct NumberValue {
    number: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProjectItem {
    id: String,
    linked_id: Option<TextValue>,
    date_updated: Option<DateValue>,
    final_comment_time: Option<DateValue>,
    num_comments: Option<NumberValue>,
}

impl From<RawProjectItem> for ProjectItem {
    fn from(raw: RawProjectItem) -> Self {
        ProjectItem {
            id: raw.id,
            linked_id: raw.linked_id.and_then(|v| v.text).filter(|t| !t.is_empty()),
            date_updated: raw.date_updated.and_then(|v| v.date),
            final_comment_date: raw.final_comment_time.and_then(|v| v.date),
            num_comments: raw.num_comments.and_then(|v| v.number),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    id: String,
    name: String,
    data_type: String,
    #[serde(default)]
    options: Vec<SelectOption>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActor {
    login: String,
    #[serde(default)]
    bot_id: Option<String>,
}

impl RawActor {
    fn into_actor(self) -> Actor {
        let is_bot = self.bot_id.is_some();
        Actor::new(self.login, is_bot)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComment {
    created_at: DateTime<Utc>,
    author: Option<RawActor>,
}

impl RawComment {
    fn into_activity(self) -> Activity {
        Activity {
            actor: self.author.map(RawActor::into_actor).unwrap_or_else(Actor::ghost),
            at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiscussionComment {
    replies: TotalCount,
    final_reply: Nodes<RawComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSearchNode {
    #[serde(rename = "__typename")]
    typename: String,
    id: String,
    url: String,
    number: u64,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    author: Option<RawActor>,
    votes: TotalCount,
    labels: Option<Nodes<RawLabel>>,
    comments: TotalCount,
    final_comment: Nodes<RawComment>,
    #[serde(default)]
    discussion_comments: Option<Nodes<RawDiscussionComment>>,
}

impl RawSearchNode {
    fn into_tracked(self) -> Option<TrackedItem> {
        let kind = match self.typename.as_str() {
            "Issue" => ItemKind::Issue,
            "PullRequest" => ItemKind::PullRequest,
            "Discussion" => ItemKind::Discussion,
            other => {
                warn!(typename = other, url = %self.url, "Ignoring unexpected search result");
                return None;
            }
        };

        let author = self
            .author
            .map(RawActor::into_actor)
            .unwrap_or_else(Actor::ghost);
        let labels: Vec<String> = self
            .labels
            .map(|l| l.nodes.into_iter().flatten().map(|l| l.name).collect())
            .unwrap_or_default();
        let last_comment = self
            .final_comment
            .nodes
            .into_iter()
            .flatten()
            .last()
            .map(RawComment::into_activity);

        let mut item = TrackedItem {
            node_id: self.id,
            kind,
            url: self.url,
            number: self.number,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
            final_comment: final_activity(last_comment, &author, self.created_at),
            author,
            total_comments: self.comments.total_count,
            votes: self.votes.total_count,
            discussion_wanted: kind == ItemKind::Discussion || labels_want_discussion(&labels),
            labels,
        };

        if let Some(threads) = self.discussion_comments {
            let threads: Vec<RawDiscussionComment> = threads.nodes.into_iter().flatten().collect();
            let reply_count = threads.iter().map(|t| t.replies.total_count).sum();
            let latest = threads.into_iter().filter_map(|t| {
                t.final_reply
                    .nodes
                    .into_iter()
                    .flatten()
                    .last()
                    .map(RawComment::into_activity)
            });
            item.roll_up_replies(reply_count, latest);
        }

        Some(item)
    }
}

// Paged query definitions

struct ProjectItemsQuery<'a> {
    project: &'a ProjectConfig,
}

impl PagedQuery for ProjectItemsQuery<'_> {
    type Node = RawProjectItem;

    fn document(&self) -> &str {
        PROJECT_ITEMS_QUERY
    }

    fn variables(&self) -> Value {
        let names = &self.project.item_field_names;
        json!({
            "projectId": self.project.id,
            "linkedIdField": names.linked_id,
            "dateUpdatedField": names.date_updated,
            "finalCommentField": names.final_comment_time,
            "numCommentsField": names.num_comments,
        })
    }

    fn connection_path(&self) -> &str {
        "/node/items"
    }
}

struct ProjectFieldsQuery<'a> {
    project_id: &'a str,
}

impl PagedQuery for ProjectFieldsQuery<'_> {
    type Node = RawField;

    fn document(&self) -> &str {
        PROJECT_FIELDS_QUERY
    }

    fn variables(&self) -> Value {
        json!({ "projectId": self.project_id })
    }

    fn connection_path(&self) -> &str {
        "/node/fields"
    }
}

struct TeamMembersQuery<'a> {
    team: &'a TeamConfig,
}

impl PagedQuery for TeamMembersQuery<'_> {
    type Node = RawMember;

    fn document(&self) -> &str {
        TEAM_MEMBERS_QUERY
    }

    fn variables(&self) -> Value {
        json!({ "org": self.team.org, "slug": self.team.slug })
    }

    fn connection_path(&self) -> &str {
        "/organization/team/members"
    }
}

struct SearchQuery<'a> {
    query: &'a str,
    kind: SearchKind,
    document: String,
}

impl PagedQuery for SearchQuery<'_> {
    type Node = RawSearchNode;

    fn document(&self) -> &str {
        &self.document
    }

    fn variables(&self) -> Value {
        json!({ "query": self.query, "type": self.kind.search_type() })
    }

    fn connection_path(&self) -> &str {
        "/search"
    }
}

// Public entry points

/// Every item currently on the board
pub async fn project_items(client: &GraphQLClient, project: &ProjectConfig) -> Result<Vec<ProjectItem>> {
    let raw = client.fetch_all(&ProjectItemsQuery { project }).await?;
    Ok(raw.into_iter().map(ProjectItem::from).collect())
}

/// Every field defined on the board
pub async fn project_fields(client: &GraphQLClient, project_id: &str) -> Result<Vec<ProjectField>> {
    let raw = client.fetch_all(&ProjectFieldsQuery { project_id }).await?;
    Ok(raw
        .into_iter()
        .map(|f| ProjectField {
            kind: FieldKind::from_data_type(&f.data_type),
            id: f.id,
            name: f.name,
            options: f.options,
        })
        .collect())
}

/// Logins of the Peloton team, plus configured extra logins
pub async fn team_logins(client: &GraphQLClient, team: &TeamConfig) -> Result<Vec<String>> {
    let raw = client.fetch_all(&TeamMembersQuery { team }).await?;

    let mut logins: Vec<String> = raw.into_iter().map(|m| m.login).collect();
    for extra in &team.extra_logins {
        if !logins.contains(extra) {
            logins.push(extra.clone());
        }
    }

    debug!(logins = %logins.join(", "), "Peloton team logins");
    Ok(logins)
}

/// Search for issues/PRs or discussions
pub async fn search_items(
    client: &GraphQLClient,
    query: &str,
    kind: SearchKind,
) -> Result<Vec<TrackedItem>> {
    let search = SearchQuery {
        query,
        kind,
        document: kind.document(),
    };
    let raw = client.fetch_all(&search).await?;
    Ok(raw.into_iter().filter_map(RawSearchNode::into_tracked).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::testing::ScriptedTransport;
    use chrono::TimeZone;

    fn one_page(path: &[&str], nodes: Value) -> Result<Value> {
        let mut value = json!({
            "pageInfo": { "hasNextPage": false, "endCursor": null },
            "nodes": nodes,
        });
        for key in path.iter().rev() {
            value = json!({ *key: value });
        }
        Ok(value)
    }

    #[test]
    fn test_search_documents() {
        let issues = SearchKind::IssuesAndPullRequests.document();
        assert!(issues.contains("... on Issue {"));
        assert!(issues.contains("... on PullRequest {"));
        assert!(!issues.contains("discussionComments"));

        let discussions = SearchKind::Discussions.document();
        assert!(discussions.contains("... on Discussion {"));
        assert!(discussions.contains("finalReply: replies(last: 1)"));
    }

    #[tokio::test]
    async fn test_project_items_parsing() {
        let transport = ScriptedTransport::new(vec![one_page(
            &["node", "items"],
            json!([
                {
                    "id": "PVTI_1",
                    "linkedId": { "text": "I_1" },
                    "dateUpdated": { "date": "2024-03-02" },
                    "finalCommentTime": { "date": "2024-03-01" },
                    "numComments": { "number": 3.0 },
                },
                {
                    "id": "PVTI_2",
                    "linkedId": null,
                    "dateUpdated": {},
                    "finalCommentTime": null,
                    "numComments": null,
                },
            ]),
        )]);
        let client = GraphQLClient::new(transport.clone(), 100);

        let items = project_items(&client, &ProjectConfig::default()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].linked_id.as_deref(), Some("I_1"));
        assert_eq!(items[0].date_updated, NaiveDate::from_ymd_opt(2024, 3, 2));
        assert_eq!(items[0].num_comments, Some(3.0));
        assert_eq!(items[1].linked_id, None);
        assert_eq!(items[1].date_updated, None);

        let (_, variables) = &transport.requests()[0];
        assert_eq!(variables["linkedIdField"], json!("_linked_id"));
        assert_eq!(variables["projectId"], json!("PVT_kwDOABU7f84ALhAI"));
    }

    #[tokio::test]
    async fn test_project_fields_parsing() {
        let transport = ScriptedTransport::new(vec![one_page(
            &["node", "fields"],
            json!([
                { "id": "F1", "name": "Date Created", "dataType": "DATE" },
                {
                    "id": "F2", "name": "Author", "dataType": "SINGLE_SELECT",
                    "options": [ { "id": "389ebec0", "name": "Peloton" } ],
                },
            ]),
        )]);
        let client = GraphQLClient::new(transport, 100);

        let fields = project_fields(&client, "PVT_1").await.unwrap();
        assert_eq!(fields[0].kind, FieldKind::Date);
        assert_eq!(fields[1].kind, FieldKind::SingleSelect);
        assert_eq!(fields[1].options[0].name, "Peloton");
    }

    #[tokio::test]
    async fn test_team_logins_include_extras_once() {
        let transport = ScriptedTransport::new(vec![one_page(
            &["organization", "team", "members"],
            json!([ { "login": "alice" }, { "login": "rcomer" } ]),
        )]);
        let client = GraphQLClient::new(transport, 100);

        let mut team = TeamConfig::default();
        team.extra_logins.push("bob".to_string());

        let logins = team_logins(&client, &team).await.unwrap();
        assert_eq!(logins, vec!["alice", "rcomer", "bob"]);
    }

    fn issue_node() -> Value {
        json!({
            "__typename": "Issue",
            "id": "I_1",
            "url": "https://github.com/SciTools/iris/issues/1",
            "number": 1,
            "title": "Broken",
            "createdAt": "2024-03-01T09:00:00Z",
            "updatedAt": "2024-03-04T09:00:00Z",
            "closedAt": null,
            "author": { "login": "alice" },
            "votes": { "totalCount": 2 },
            "labels": { "nodes": [ { "name": "Status: Decision Required" } ] },
            "comments": { "totalCount": 1 },
            "finalComment": { "nodes": [
                { "createdAt": "2024-03-03T09:00:00Z", "author": { "login": "codecov", "botId": "BOT_1" } }
            ] },
        })
    }

    #[tokio::test]
    async fn test_search_issue_conversion() {
        let mut no_comments = issue_node();
        no_comments["id"] = json!("I_2");
        no_comments["__typename"] = json!("PullRequest");
        no_comments["labels"] = json!({ "nodes": [] });
        no_comments["comments"] = json!({ "totalCount": 0 });
        no_comments["finalComment"] = json!({ "nodes": [] });
        no_comments["author"] = Value::Null;

        let transport = ScriptedTransport::new(vec![one_page(
            &["search"],
            json!([issue_node(), no_comments]),
        )]);
        let client = GraphQLClient::new(transport.clone(), 100);

        let items = search_items(&client, "org:SciTools", SearchKind::IssuesAndPullRequests)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);

        let issue = &items[0];
        assert_eq!(issue.kind, ItemKind::Issue);
        assert_eq!(issue.votes, 2);
        assert!(issue.discussion_wanted);
        assert_eq!(issue.final_comment.actor, Actor::new("codecov", true));
        assert_eq!(
            issue.final_comment.at,
            Utc.with_ymd_and_hms(2024, 3, 3, 9, 0, 0).unwrap()
        );

        // No comments and no author: back-filled from the (ghost) author
        let pr = &items[1];
        assert_eq!(pr.kind, ItemKind::PullRequest);
        assert!(!pr.discussion_wanted);
        assert_eq!(pr.author.login, "ghost");
        assert_eq!(pr.final_comment.actor.login, "ghost");
        assert_eq!(pr.final_comment.at, pr.created_at);

        let (_, variables) = &transport.requests()[0];
        assert_eq!(variables["type"], json!("ISSUE"));
        assert_eq!(variables["query"], json!("org:SciTools"));
    }

    #[tokio::test]
    async fn test_search_discussion_rolls_up_replies() {
        let mut discussion = issue_node();
        discussion["__typename"] = json!("Discussion");
        discussion["id"] = json!("D_1");
        discussion["labels"] = json!({ "nodes": [] });
        discussion["comments"] = json!({ "totalCount": 2 });
        discussion["discussionComments"] = json!({ "nodes": [
            { "replies": { "totalCount": 2 }, "finalReply": { "nodes": [
                { "createdAt": "2024-03-05T09:00:00Z", "author": { "login": "bob" } }
            ] } },
            { "replies": { "totalCount": 0 }, "finalReply": { "nodes": [] } },
        ] });

        let transport = ScriptedTransport::new(vec![one_page(&["search"], json!([discussion]))]);
        let client = GraphQLClient::new(transport.clone(), 100);

        let items = search_items(&client, "org:SciTools", SearchKind::Discussions)
            .await
            .unwrap();
        let item = &items[0];
        assert!(item.use_draft());
        assert!(item.discussion_wanted);
        assert_eq!(item.total_comments, 4);
        assert_eq!(item.final_comment.actor, Actor::new("bob", false));

        let (_, variables) = &transport.requests()[0];
        assert_eq!(variables["type"], json!("DISCUSSION"));
    }
}
