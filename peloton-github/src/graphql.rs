//! GitHub GraphQL transport and cursor pagination

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{Error, Result};

/// GraphQL query response wrapper
#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error
#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

/// Something that can execute a GraphQL document and return its `data`
#[async_trait]
pub trait GraphQLTransport: Send + Sync {
    async fn execute(&self, document: &str, variables: &Value) -> Result<Value>;
}

/// Transport over HTTPS with a bearer token
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GraphQLTransport for HttpTransport {
    async fn execute(&self, document: &str, variables: &Value) -> Result<Value> {
        debug!(%document, %variables, "Executing GraphQL document");

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "peloton-github")
            .json(&json!({
                "query": document,
                "variables": variables,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Auth("Invalid GitHub token".to_string()));
        }
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());
            return Err(Error::Http(format!("status {}: {}", status, text)));
        }

        let graphql_response: GraphQLResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("Failed to parse GraphQL response: {}", e)))?;

        into_data(graphql_response)
    }
}

fn into_data(response: GraphQLResponse) -> Result<Value> {
    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(Error::GraphQL(messages.join(", ")));
    }

    response
        .data
        .ok_or_else(|| Error::MissingField("data".to_string()))
}

/// Relay page info
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a relay connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub page_info: PageInfo,
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Option<T>>,
}

/// A query returning a paginated connection
///
/// The document must declare `$first: Int!` and `$after: String` and apply
/// them to the paginated selection, which must select
/// `pageInfo { hasNextPage endCursor }` and `nodes`.
pub trait PagedQuery {
    type Node: DeserializeOwned;

    fn document(&self) -> &str;

    /// Variables other than `first` and `after`
    fn variables(&self) -> Value;

    /// JSON pointer to the connection within `data`, e.g. `/node/items`
    fn connection_path(&self) -> &str;
}

/// GraphQL client shared by queries and mutations
#[derive(Clone)]
pub struct GraphQLClient {
    transport: Arc<dyn GraphQLTransport>,
    page_size: u32,
}

impl GraphQLClient {
    pub fn new(transport: Arc<dyn GraphQLTransport>, page_size: u32) -> Self {
        Self {
            transport,
            page_size: page_size.clamp(1, 100),
        }
    }

    pub async fn execute(&self, document: &str, variables: &Value) -> Result<Value> {
        self.transport.execute(document, variables).await
    }

    /// Run a paged query until the last page, returning every node
    pub async fn fetch_all<Q: PagedQuery + Sync>(&self, query: &Q) -> Result<Vec<Q::Node>> {
        let mut all = Vec::new();
        let mut after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut variables = query.variables();
            if let Value::Object(map) = &mut variables {
                map.insert("first".to_string(), json!(self.page_size));
                map.insert("after".to_string(), json!(after));
            }

            let data = self.transport.execute(query.document(), &variables).await?;
            let path = query.connection_path();
            let page = data
                .pointer(path)
                .cloned()
                .filter(|v| !v.is_null())
                .ok_or_else(|| Error::MissingField(path.to_string()))?;
            let page: Connection<Q::Node> = serde_json::from_value(page)?;

            pages += 1;
            all.extend(page.nodes.into_iter().flatten());

            match (page.page_info.has_next_page, page.page_info.end_cursor) {
                (true, Some(cursor)) => after = Some(cursor),
                _ => break,
            }
        }

        debug!(pages, count = all.len(), "Fetched all pages");
        Ok(all)
    }
}

impl std::fmt::Debug for GraphQLClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLClient")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;

    struct Logins;

    #[derive(Debug, Deserialize)]
    struct LoginNode {
        login: String,
    }

    impl PagedQuery for Logins {
        type Node = LoginNode;

        fn document(&self) -> &str {
            "query($first: Int!, $after: String) { team { members(first: $first, after: $after) { pageInfo { hasNextPage endCursor } nodes { login } } } }"
        }

        fn variables(&self) -> Value {
            json!({ "org": "SciTools" })
        }

        fn connection_path(&self) -> &str {
            "/team/members"
        }
    }

    fn page(logins: &[&str], next: Option<&str>) -> Result<Value> {
        let nodes: Vec<Value> = logins.iter().map(|l| json!({ "login": l })).collect();
        Ok(json!({
            "team": { "members": {
                "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next },
                "nodes": nodes,
            }}
        }))
    }

    #[tokio::test]
    async fn test_fetch_all_follows_cursors() {
        let transport = ScriptedTransport::new(vec![
            page(&["a", "b"], Some("c1")),
            page(&["c"], Some("c2")),
            page(&["d"], None),
        ]);
        let client = GraphQLClient::new(transport.clone(), 2);

        let nodes = client.fetch_all(&Logins).await.unwrap();
        let logins: Vec<&str> = nodes.iter().map(|n| n.login.as_str()).collect();
        assert_eq!(logins, vec!["a", "b", "c", "d"]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].1["after"], Value::Null);
        assert_eq!(requests[0].1["first"], json!(2));
        assert_eq!(requests[0].1["org"], json!("SciTools"));
        assert_eq!(requests[1].1["after"], json!("c1"));
        assert_eq!(requests[2].1["after"], json!("c2"));
    }

    #[tokio::test]
    async fn test_fetch_all_skips_null_nodes() {
        let transport = ScriptedTransport::new(vec![Ok(json!({
            "team": { "members": {
                "pageInfo": { "hasNextPage": false, "endCursor": null },
                "nodes": [ { "login": "a" }, null ],
            }}
        }))]);
        let client = GraphQLClient::new(transport, 100);

        assert_eq!(client.fetch_all(&Logins).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_missing_connection() {
        let transport = ScriptedTransport::new(vec![Ok(json!({ "team": null }))]);
        let client = GraphQLClient::new(transport, 100);

        let err = client.fetch_all(&Logins).await.unwrap_err();
        assert!(matches!(err, Error::MissingField(path) if path == "/team/members"));
    }

    #[test]
    fn test_graphql_errors_reported() {
        let response: GraphQLResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [ { "message": "Could not resolve" }, { "message": "Timeout" } ],
        }))
        .unwrap();
        let err = into_data(response).unwrap_err();
        assert_eq!(err.to_string(), "GraphQL errors: Could not resolve, Timeout");
    }

    #[test]
    fn test_page_size_clamped() {
        let client = GraphQLClient::new(ScriptedTransport::new(vec![]), 500);
        assert_eq!(client.page_size, 100);
    }
}
