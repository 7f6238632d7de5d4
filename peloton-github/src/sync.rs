//! Keeping the Peloton project board in step with GitHub search results

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use peloton_core::fields::kinds_by_id;
use peloton_core::reconcile::plan;
use peloton_core::search::conditions;
use peloton_core::{Config, Roster, SyncMode, SyncPlan, TrackedItem, UpdateContext};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::graphql::GraphQLClient;
use crate::mutations::{Mutation, MutationRunner};
use crate::queries::{project_fields, project_items, search_items, team_logins, SearchKind};
use crate::{Error, Result};

/// What one pass did
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub mode: SyncMode,
    /// Taken just before searching; the next incremental pass starts here
    pub started_at: DateTime<Utc>,
    pub tracked: usize,
    pub removed: usize,
    pub cleared: usize,
    pub added_issues: usize,
    pub added_drafts: usize,
    pub updated: usize,
}

/// Board synchronisation driver
#[derive(Debug)]
pub struct ProjectSync {
    client: GraphQLClient,
    runner: MutationRunner,
    config: Config,
}

impl ProjectSync {
    pub fn new(client: GraphQLClient, config: Config) -> Self {
        let runner = MutationRunner::new(client.clone(), &config.sync);
        Self {
            client,
            runner,
            config,
        }
    }

    /// Peloton team roster, fetched once per run
    pub async fn roster(&self) -> Result<Roster> {
        let logins = team_logins(&self.client, &self.config.team).await?;
        let roster = Roster::new(logins, self.config.team.bot_overrides.clone());
        if roster.is_empty() {
            warn!(team = %self.config.team.slug, "Peloton team has no members");
        } else {
            debug!(members = roster.len(), "Fetched Peloton team");
        }
        Ok(roster)
    }

    /// Full refresh, then incremental passes until `loop_for` has elapsed
    pub async fn run(&self, loop_for: Duration) -> Result<Vec<PassReport>> {
        let deadline = Instant::now() + loop_for;
        let interval = self.config.sync.loop_interval;
        let roster = self.roster().await?;

        info!("Starting full refresh");
        let full = self.pass(&roster, SyncMode::Full, None).await?;
        if !loop_for.is_zero() {
            info!(
                minutes = loop_for.as_secs() / 60,
                interval_secs = interval.as_secs(),
                "Full refresh complete, looping incremental updates"
            );
        } else {
            info!("Full refresh complete");
        }

        let mut since = full.started_at;
        let mut reports = vec![full];

        loop {
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                break;
            }

            info!("Starting incremental update loop");
            let report = self.pass(&roster, SyncMode::Incremental, Some(since)).await?;
            since = report.started_at;
            reports.push(report);
            info!("Incremental update loop complete");
        }

        Ok(reports)
    }

    /// One pass over the board
    pub async fn pass(
        &self,
        roster: &Roster,
        mode: SyncMode,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<PassReport> {
        let project = &self.config.project;

        info!("Fetching data");
        let board = project_items(&self.client, project).await?;
        debug!(items = board.len(), "Fetched project items");

        let started_at = Utc::now();
        let query = conditions(&self.config.search, started_at.date_naive(), updated_since);
        debug!(%query, "Searching");

        let mut tracked = search_items(&self.client, &query, SearchKind::IssuesAndPullRequests).await?;
        let issue_count = tracked.len();
        tracked.extend(search_items(&self.client, &query, SearchKind::Discussions).await?);
        debug!(
            issues = issue_count,
            discussions = tracked.len() - issue_count,
            "Search complete"
        );
        info!("Data fetch complete");

        let mut planned = plan(&board, &tracked, mode);
        let by_node: HashMap<&str, &TrackedItem> =
            tracked.iter().map(|t| (t.node_id.as_str(), t)).collect();

        let report = PassReport {
            mode,
            started_at,
            tracked: tracked.len(),
            removed: planned.remove.len(),
            cleared: planned.clear_next_date.len(),
            added_issues: planned.add_linked.len(),
            added_drafts: planned.add_drafts.len(),
            updated: planned.update.len(),
        };

        self.remove_items(&planned).await?;
        self.clear_next_date(&planned, &board_urls(&planned, &by_node)).await?;
        self.add_items(&mut planned, &by_node).await?;
        self.update_fields(&planned, &by_node, roster).await?;

        Ok(report)
    }

    async fn remove_items(&self, planned: &SyncPlan) -> Result<()> {
        if planned.remove.is_empty() {
            return Ok(());
        }

        info!(count = planned.remove.len(), "Removing from project");
        debug!(items = %planned.remove.join(", "), "Removing project items");

        let mutations: Vec<Mutation> = planned
            .remove
            .iter()
            .map(|item_id| Mutation::DeleteItem {
                project_id: self.config.project.id.clone(),
                item_id: item_id.clone(),
            })
            .collect();
        self.runner.run(&mutations).await?;
        Ok(())
    }

    async fn clear_next_date(&self, planned: &SyncPlan, urls: &HashMap<&str, &str>) -> Result<()> {
        if planned.clear_next_date.is_empty() {
            return Ok(());
        }

        info!(count = planned.clear_next_date.len(), "Clearing next-peloton-date");
        for item_id in &planned.clear_next_date {
            let url = urls.get(item_id.as_str()).copied().unwrap_or(item_id.as_str());
            debug!(url, "New comments");
        }

        let mutations: Vec<Mutation> = planned
            .clear_next_date
            .iter()
            .map(|item_id| Mutation::ClearField {
                project_id: self.config.project.id.clone(),
                item_id: item_id.clone(),
                field_id: self.config.project.next_peloton_date_field.clone(),
            })
            .collect();
        self.runner.run(&mutations).await?;
        Ok(())
    }

    /// Add missing issues and discussions, recording their new item IDs
    async fn add_items(
        &self,
        planned: &mut SyncPlan,
        by_node: &HashMap<&str, &TrackedItem>,
    ) -> Result<()> {
        let project_id = &self.config.project.id;

        if !planned.add_linked.is_empty() {
            info!(count = planned.add_linked.len(), "Adding issues to project");
            let mutations = planned
                .add_linked
                .iter()
                .map(|node_id| {
                    let item = lookup(by_node, node_id)?;
                    debug!(url = %item.url, "Adding issue");
                    Ok(Mutation::AddItem {
                        project_id: project_id.clone(),
                        content_id: node_id.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let ids = self.runner.run_adds(&mutations).await?;
            planned
                .on_board
                .extend(planned.add_linked.iter().cloned().zip(ids));
        }

        if !planned.add_drafts.is_empty() {
            info!(count = planned.add_drafts.len(), "Adding discussions to project");
            let mutations = planned
                .add_drafts
                .iter()
                .map(|node_id| {
                    let item = lookup(by_node, node_id)?;
                    debug!(url = %item.url, "Adding discussion");
                    Ok(Mutation::AddDraft {
                        project_id: project_id.clone(),
                        title: item.title.clone(),
                        body: item.url.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let ids = self.runner.run_adds(&mutations).await?;
            planned
                .on_board
                .extend(planned.add_drafts.iter().cloned().zip(ids));
        }

        Ok(())
    }

    async fn update_fields(
        &self,
        planned: &SyncPlan,
        by_node: &HashMap<&str, &TrackedItem>,
        roster: &Roster,
    ) -> Result<()> {
        if planned.update.is_empty() {
            return Ok(());
        }

        info!(count = planned.update.len(), "Updating project fields");

        let fields = project_fields(&self.client, &self.config.project.id).await?;
        let kinds = kinds_by_id(&fields);
        let context = UpdateContext {
            project: &self.config.project,
            selections: &self.config.selections,
            roster,
            kinds: &kinds,
        };

        let mut mutations = Vec::new();
        for node_id in &planned.update {
            let item = lookup(by_node, node_id)?;
            let item_id = planned.on_board.get(node_id).ok_or_else(|| {
                Error::Other(format!("{} has no project item to update", item.url))
            })?;
            debug!(url = %item.url, "Updating");

            for update in context.field_updates(item_id, item)? {
                mutations.push(Mutation::from_update(&self.config.project.id, update));
            }
        }

        self.runner.run(&mutations).await?;
        Ok(())
    }
}

fn lookup<'a>(by_node: &HashMap<&str, &'a TrackedItem>, node_id: &str) -> Result<&'a TrackedItem> {
    by_node
        .get(node_id)
        .copied()
        .ok_or_else(|| Error::Other(format!("{} is not among the search results", node_id)))
}

/// URL of each board item that matched a search result
fn board_urls<'a>(
    planned: &'a SyncPlan,
    by_node: &HashMap<&str, &'a TrackedItem>,
) -> HashMap<&'a str, &'a str> {
    planned
        .on_board
        .iter()
        .filter_map(|(node_id, item_id)| {
            by_node
                .get(node_id.as_str())
                .copied()
                .map(|t| (item_id.as_str(), t.url.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::testing::ScriptedTransport;
    use peloton_core::item::Column;
    use serde_json::{json, Value};

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.sync.retry_delay = Duration::ZERO;
        config.sync.mutation_pause = Duration::ZERO;
        config
    }

    fn page(path: &[&str], nodes: Value) -> Result<Value> {
        let mut value = json!({
            "pageInfo": { "hasNextPage": false, "endCursor": null },
            "nodes": nodes,
        });
        for key in path.iter().rev() {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert(key.to_string(), value);
            value = Value::Object(wrapper);
        }
        Ok(value)
    }

    /// Field definitions matching the default field map
    fn board_fields(config: &Config) -> Value {
        let mut fields = vec![json!({
            "id": config.project.link_field, "name": "_linked_id", "dataType": "TEXT",
        })];
        for mapping in &config.project.field_map {
            let data_type = match mapping.column {
                Column::CreatedAt
                | Column::UpdatedAt
                | Column::ClosedAt
                | Column::FinalCommentTime => "DATE",
                Column::TotalComments | Column::Votes => "NUMBER",
                Column::FinalCommentLogin | Column::AuthorLogin => "TEXT",
                Column::AuthorMembership
                | Column::CommenterMembership
                | Column::DiscussionWanted => "SINGLE_SELECT",
            };
            fields.push(json!({ "id": mapping.field, "name": mapping.field, "dataType": data_type }));
        }
        Value::Array(fields)
    }

    fn issue(id: &str) -> Value {
        json!({
            "__typename": "Issue",
            "id": id,
            "url": format!("https://github.com/SciTools/iris/issues/{}", id),
            "number": 1,
            "title": "Broken",
            "createdAt": "2024-03-01T09:00:00Z",
            "updatedAt": "2024-03-04T09:00:00Z",
            "closedAt": null,
            "author": { "login": "alice" },
            "votes": { "totalCount": 0 },
            "labels": { "nodes": [] },
            "comments": { "totalCount": 0 },
            "finalComment": { "nodes": [] },
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pass_prunes_adds_and_updates() {
        let config = quiet_config();
        let transport = ScriptedTransport::new(vec![
            page(
                &["node", "items"],
                json!([ { "id": "PVTI_gone", "linkedId": { "text": "I_gone" } } ]),
            ),
            page(&["search"], json!([issue("I_1")])),
            page(&["search"], json!([])),
            Ok(json!({ "op_0": { "deletedItemId": "PVTI_gone" } })),
            Ok(json!({ "op_0": { "item": { "id": "PVTI_new" } } })),
            page(&["node", "fields"], board_fields(&config)),
            Ok((0..12)
                .map(|ix| (format!("op_{}", ix), json!({ "projectV2Item": { "id": "PVTI_new" } })))
                .collect::<serde_json::Map<_, _>>()
                .into()),
        ]);
        let sync = ProjectSync::new(GraphQLClient::new(transport.clone(), 100), config.clone());
        let roster = Roster::new(vec!["alice".to_string()], Vec::new());

        let report = sync.pass(&roster, SyncMode::Full, None).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.added_issues, 1);
        assert_eq!(report.added_drafts, 0);
        assert_eq!(report.updated, 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 7);
        assert!(requests[3].0.contains("deleteProjectV2Item"));
        assert_eq!(requests[4].1["input_0"]["contentId"], json!("I_1"));

        let (document, variables) = &requests[6];
        assert!(document.contains("op_11:"));
        assert_eq!(variables["input_0"]["itemId"], json!("PVTI_new"));
        assert_eq!(variables["input_0"]["fieldId"], json!(config.project.link_field));
        assert_eq!(variables["input_0"]["value"], json!({ "text": "I_1" }));

        let author_field = config
            .project
            .field_map
            .iter()
            .find(|m| m.column == Column::AuthorMembership)
            .map(|m| m.field.clone())
            .unwrap();
        let author_update = (0..12)
            .map(|ix| &variables[format!("input_{}", ix)])
            .find(|input| input["fieldId"] == json!(author_field))
            .unwrap();
        assert_eq!(
            author_update["value"],
            json!({ "singleSelectOptionId": config.selections.author_peloton })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pass_clears_next_date_and_adds_drafts() {
        let mut config = quiet_config();
        config.sync.mutation_page_size = 50;

        let mut discussion = issue("D_1");
        discussion["__typename"] = json!("Discussion");
        discussion["title"] = json!("Ideas");
        discussion["url"] = json!("https://github.com/orgs/SciTools/discussions/1");

        let transport = ScriptedTransport::new(vec![
            // Board stats say 3 comments; the issue now has none
            page(
                &["node", "items"],
                json!([{
                    "id": "PVTI_1",
                    "linkedId": { "text": "I_1" },
                    "dateUpdated": { "date": "2024-03-04" },
                    "finalCommentTime": { "date": "2024-03-01" },
                    "numComments": { "number": 3.0 },
                }]),
            ),
            page(&["search"], json!([issue("I_1")])),
            page(&["search"], json!([discussion])),
            Ok(json!({ "op_0": { "projectV2Item": { "id": "PVTI_1" } } })),
            Ok(json!({ "op_0": { "projectItem": { "id": "PVTI_draft" } } })),
            page(&["node", "fields"], board_fields(&config)),
            Ok((0..24)
                .map(|ix| (format!("op_{}", ix), json!({ "projectV2Item": { "id": "PVTI" } })))
                .collect::<serde_json::Map<_, _>>()
                .into()),
        ]);
        let sync = ProjectSync::new(GraphQLClient::new(transport.clone(), 100), config.clone());

        let report = sync
            .pass(&Roster::default(), SyncMode::Full, None)
            .await
            .unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.cleared, 1);
        assert_eq!(report.added_issues, 0);
        assert_eq!(report.added_drafts, 1);
        assert_eq!(report.updated, 2);

        let requests = transport.requests();
        assert_eq!(requests.len(), 7);

        let (clear, variables) = &requests[3];
        assert!(clear.contains("clearProjectV2ItemFieldValue"));
        assert_eq!(variables["input_0"]["itemId"], json!("PVTI_1"));
        assert_eq!(
            variables["input_0"]["fieldId"],
            json!(config.project.next_peloton_date_field)
        );

        let (add, variables) = &requests[4];
        assert!(add.contains("addProjectV2DraftIssue"));
        assert_eq!(variables["input_0"]["title"], json!("Ideas"));
        assert_eq!(
            variables["input_0"]["body"],
            json!("https://github.com/orgs/SciTools/discussions/1")
        );

        // Issue fields first, then the new draft's, keyed by its new item ID
        let (_, variables) = &requests[6];
        assert_eq!(variables["input_0"]["itemId"], json!("PVTI_1"));
        assert_eq!(variables["input_12"]["itemId"], json!("PVTI_draft"));
        assert_eq!(variables["input_12"]["fieldId"], json!(config.project.link_field));
        assert_eq!(variables["input_12"]["value"], json!({ "text": "D_1" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_with_nothing_to_do() {
        let transport = ScriptedTransport::new(vec![
            page(&["node", "items"], json!([])),
            page(&["search"], json!([])),
            page(&["search"], json!([])),
        ]);
        let sync = ProjectSync::new(GraphQLClient::new(transport.clone(), 100), quiet_config());

        let report = sync
            .pass(&Roster::default(), SyncMode::Full, None)
            .await
            .unwrap();
        assert_eq!(report.tracked, 0);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loops_incrementally_until_deadline() {
        let empty_pass = || {
            vec![
                page(&["node", "items"], json!([])),
                page(&["search"], json!([])),
                page(&["search"], json!([])),
            ]
        };
        let mut responses = vec![page(
            &["organization", "team", "members"],
            json!([ { "login": "alice" } ]),
        )];
        responses.extend(empty_pass());
        responses.extend(empty_pass());

        let transport = ScriptedTransport::new(responses);
        let sync = ProjectSync::new(GraphQLClient::new(transport.clone(), 100), quiet_config());

        // 60s interval: one incremental pass fits before the 90s deadline
        let reports = sync.run(Duration::from_secs(90)).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].mode, SyncMode::Full);
        assert_eq!(reports[1].mode, SyncMode::Incremental);

        let requests = transport.requests();
        assert_eq!(requests.len(), 7);
        let full_query = requests[2].1["query"].as_str().unwrap();
        let incremental_query = requests[5].1["query"].as_str().unwrap();
        assert!(!full_query.contains("updated:>="));
        assert!(incremental_query.contains("updated:>="));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_without_loop_is_single_pass() {
        let transport = ScriptedTransport::new(vec![
            page(&["organization", "team", "members"], json!([])),
            page(&["node", "items"], json!([])),
            page(&["search"], json!([])),
            page(&["search"], json!([])),
        ]);
        let sync = ProjectSync::new(GraphQLClient::new(transport.clone(), 100), quiet_config());

        let reports = sync.run(Duration::ZERO).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(transport.requests().len(), 4);
    }
}
