//! Batched project mutations
//!
//! Many mutations of one kind are sent in a single document, each aliased
//! `op_N` with its input passed as the variable `$input_N`. Batches are
//! retried on failure, and a pause between batches keeps clear of GitHub's
//! secondary rate limits.

use std::time::Duration;

use peloton_core::config::SyncConfig;
use peloton_core::{FieldUpdate, FieldValue};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::graphql::GraphQLClient;
use crate::{Error, Result};

/// One project mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Link an issue or pull request to the board
    AddItem { project_id: String, content_id: String },
    /// Add a draft item, used for discussions
    AddDraft {
        project_id: String,
        title: String,
        body: String,
    },
    DeleteItem { project_id: String, item_id: String },
    UpdateField {
        project_id: String,
        item_id: String,
        field_id: String,
        value: FieldValue,
    },
    ClearField {
        project_id: String,
        item_id: String,
        field_id: String,
    },
}

impl Mutation {
    /// Set or clear a field, depending on whether the update carries a value
    pub fn from_update(project_id: &str, update: FieldUpdate) -> Self {
        let FieldUpdate {
            item_id,
            field_id,
            value,
        } = update;
        match value {
            Some(value) => Mutation::UpdateField {
                project_id: project_id.to_string(),
                item_id,
                field_id,
                value,
            },
            None => Mutation::ClearField {
                project_id: project_id.to_string(),
                item_id,
                field_id,
            },
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Mutation::AddItem { .. } => "addProjectV2ItemById",
            Mutation::AddDraft { .. } => "addProjectV2DraftIssue",
            Mutation::DeleteItem { .. } => "deleteProjectV2Item",
            Mutation::UpdateField { .. } => "updateProjectV2ItemFieldValue",
            Mutation::ClearField { .. } => "clearProjectV2ItemFieldValue",
        }
    }

    fn input_type(&self) -> &'static str {
        match self {
            Mutation::AddItem { .. } => "AddProjectV2ItemByIdInput",
            Mutation::AddDraft { .. } => "AddProjectV2DraftIssueInput",
            Mutation::DeleteItem { .. } => "DeleteProjectV2ItemInput",
            Mutation::UpdateField { .. } => "UpdateProjectV2ItemFieldValueInput",
            Mutation::ClearField { .. } => "ClearProjectV2ItemFieldValueInput",
        }
    }

    fn payload_selection(&self) -> &'static str {
        match self {
            Mutation::AddItem { .. } => "item { id }",
            Mutation::AddDraft { .. } => "projectItem { id }",
            Mutation::DeleteItem { .. } => "deletedItemId",
            Mutation::UpdateField { .. } | Mutation::ClearField { .. } => "projectV2Item { id }",
        }
    }

    fn input(&self) -> Value {
        match self {
            Mutation::AddItem {
                project_id,
                content_id,
            } => json!({ "projectId": project_id, "contentId": content_id }),
            Mutation::AddDraft {
                project_id,
                title,
                body,
            } => json!({ "projectId": project_id, "title": title, "body": body }),
            Mutation::DeleteItem {
                project_id,
                item_id,
            } => json!({ "projectId": project_id, "itemId": item_id }),
            Mutation::UpdateField {
                project_id,
                item_id,
                field_id,
                value,
            } => json!({
                "projectId": project_id,
                "itemId": item_id,
                "fieldId": field_id,
                "value": value,
            }),
            Mutation::ClearField {
                project_id,
                item_id,
                field_id,
            } => json!({ "projectId": project_id, "itemId": item_id, "fieldId": field_id }),
        }
    }

    /// JSON pointer to the new project item ID in this mutation's payload
    fn created_item_pointer(&self) -> Option<&'static str> {
        match self {
            Mutation::AddItem { .. } => Some("/item/id"),
            Mutation::AddDraft { .. } => Some("/projectItem/id"),
            _ => None,
        }
    }
}

/// Build one aliased document, and its variables, for a batch
fn batch_document(batch: &[Mutation]) -> (String, Value) {
    let mut params = Vec::with_capacity(batch.len());
    let mut fields = String::new();
    let mut variables = Map::new();

    for (ix, mutation) in batch.iter().enumerate() {
        params.push(format!("$input_{}: {}!", ix, mutation.input_type()));
        fields.push_str(&format!(
            "  op_{ix}: {name}(input: $input_{ix}) {{ {payload} }}\n",
            name = mutation.name(),
            payload = mutation.payload_selection(),
        ));
        variables.insert(format!("input_{}", ix), mutation.input());
    }

    let document = format!("mutation({}) {{\n{}}}", params.join(", "), fields);
    (document, Value::Object(variables))
}

/// Runs mutations in batches with retries and pauses
#[derive(Debug, Clone)]
pub struct MutationRunner {
    client: GraphQLClient,
    batch_size: usize,
    retry_attempts: u32,
    retry_delay: Duration,
    pause: Duration,
}

impl MutationRunner {
    pub fn new(client: GraphQLClient, sync: &SyncConfig) -> Self {
        Self {
            client,
            batch_size: sync.mutation_page_size.max(1),
            retry_attempts: sync.retry_attempts.max(1),
            retry_delay: sync.retry_delay,
            pause: sync.mutation_pause,
        }
    }

    /// Run every mutation, returning each payload in input order
    pub async fn run(&self, mutations: &[Mutation]) -> Result<Vec<Value>> {
        let mut payloads = Vec::with_capacity(mutations.len());

        for (ix, batch) in mutations.chunks(self.batch_size).enumerate() {
            if ix > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            payloads.extend(self.run_batch(batch).await?);
        }

        Ok(payloads)
    }

    /// Run add mutations, returning the new project item IDs in input order
    pub async fn run_adds(&self, mutations: &[Mutation]) -> Result<Vec<String>> {
        let payloads = self.run(mutations).await?;

        mutations
            .iter()
            .zip(payloads)
            .map(|(mutation, payload)| {
                let pointer = mutation.created_item_pointer().ok_or_else(|| {
                    Error::Other(format!("{} does not create a project item", mutation.name()))
                })?;
                payload
                    .pointer(pointer)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::MissingField(format!("{}{}", mutation.name(), pointer)))
            })
            .collect()
    }

    async fn run_batch(&self, batch: &[Mutation]) -> Result<Vec<Value>> {
        let (document, variables) = batch_document(batch);
        debug!(size = batch.len(), kind = batch[0].name(), "Running mutation batch");

        let mut attempt = 1;
        let data = loop {
            match self.client.execute(&document, &variables).await {
                Ok(data) => break data,
                Err(e) if attempt < self.retry_attempts => {
                    warn!(attempt, error = %e, "Mutation batch failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        (0..batch.len())
            .map(|ix| {
                let alias = format!("op_{}", ix);
                data.get(&alias)
                    .cloned()
                    .ok_or(Error::MissingField(alias))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::testing::ScriptedTransport;
    use chrono::NaiveDate;

    fn sync_config(batch: usize) -> SyncConfig {
        SyncConfig {
            mutation_page_size: batch,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(5),
            mutation_pause: Duration::from_secs(5),
            ..SyncConfig::default()
        }
    }

    fn add(content: &str) -> Mutation {
        Mutation::AddItem {
            project_id: "PVT_1".to_string(),
            content_id: content.to_string(),
        }
    }

    #[test]
    fn test_batch_document_aliases_and_variables() {
        let batch = vec![
            add("I_1"),
            Mutation::from_update(
                "PVT_1",
                FieldUpdate {
                    item_id: "PVTI_1".to_string(),
                    field_id: "F_DATE".to_string(),
                    value: Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())),
                },
            ),
        ];

        let (document, variables) = batch_document(&batch);
        assert!(document.starts_with(
            "mutation($input_0: AddProjectV2ItemByIdInput!, $input_1: UpdateProjectV2ItemFieldValueInput!)"
        ));
        assert!(document.contains("op_0: addProjectV2ItemById(input: $input_0) { item { id } }"));
        assert!(document.contains("op_1: updateProjectV2ItemFieldValue(input: $input_1)"));
        assert_eq!(variables["input_0"]["contentId"], json!("I_1"));
        assert_eq!(variables["input_1"]["value"], json!({ "date": "2024-03-01" }));
    }

    #[test]
    fn test_update_without_value_clears() {
        let mutation = Mutation::from_update(
            "PVT_1",
            FieldUpdate {
                item_id: "PVTI_1".to_string(),
                field_id: "F_CLOSED".to_string(),
                value: None,
            },
        );
        assert_eq!(mutation.name(), "clearProjectV2ItemFieldValue");
        assert!(mutation.input().get("value").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_adds_batches_in_order() {
        let transport = ScriptedTransport::new(vec![
            Ok(json!({
                "op_0": { "item": { "id": "PVTI_1" } },
                "op_1": { "item": { "id": "PVTI_2" } },
            })),
            Ok(json!({ "op_0": { "item": { "id": "PVTI_3" } } })),
        ]);
        let runner = MutationRunner::new(GraphQLClient::new(transport.clone(), 100), &sync_config(2));

        let ids = runner
            .run_adds(&[add("I_1"), add("I_2"), add("I_3")])
            .await
            .unwrap();
        assert_eq!(ids, vec!["PVTI_1", "PVTI_2", "PVTI_3"]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].1["input_0"]["contentId"], json!("I_3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_retried_after_failure() {
        let transport = ScriptedTransport::new(vec![
            Err(Error::Http("timeout".to_string())),
            Ok(json!({ "op_0": { "deletedItemId": "PVTI_1" } })),
        ]);
        let runner = MutationRunner::new(GraphQLClient::new(transport.clone(), 100), &sync_config(20));

        let payloads = runner
            .run(&[Mutation::DeleteItem {
                project_id: "PVT_1".to_string(),
                item_id: "PVTI_1".to_string(),
            }])
            .await
            .unwrap();
        assert_eq!(payloads[0]["deletedItemId"], json!("PVTI_1"));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_gives_up_after_attempts() {
        let transport = ScriptedTransport::new(vec![
            Err(Error::Http("timeout 1".to_string())),
            Err(Error::Http("timeout 2".to_string())),
            Err(Error::Http("timeout 3".to_string())),
        ]);
        let runner = MutationRunner::new(GraphQLClient::new(transport.clone(), 100), &sync_config(20));

        let err = runner.run(&[add("I_1")]).await.unwrap_err();
        assert_eq!(err.to_string(), "GraphQL request failed: timeout 3");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_no_mutations_no_requests() {
        let transport = ScriptedTransport::new(vec![]);
        let runner = MutationRunner::new(GraphQLClient::new(transport.clone(), 100), &sync_config(20));

        assert!(runner.run(&[]).await.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }
}
