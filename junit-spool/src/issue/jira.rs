// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{FailureSignature, IssueInfo, IssueTracker};
use crate::{config::IssueTrackerConfig, errors::IssueLookupError};
use base64::{Engine, engine::general_purpose::STANDARD};
use debug_ignore::DebugIgnore;
use serde::Deserialize;
use std::time::Duration;
use ureq::Agent;

/// Searches a JIRA server's REST API for issues whose description mentions a failure.
#[derive(Debug)]
pub struct JiraTracker {
    endpoint: String,
    authorization: DebugIgnore<String>,
    timeout: Duration,
    agent: DebugIgnore<Agent>,
}

impl JiraTracker {
    /// Creates a client for the configured server. No request is made until the first lookup.
    pub fn new(config: &IssueTrackerConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build();
        let credentials = format!("{}:{}", config.principal(), config.credential());
        Self {
            endpoint: config.endpoint().trim_end_matches('/').to_owned(),
            authorization: DebugIgnore(format!("Basic {}", STANDARD.encode(credentials))),
            timeout: config.timeout(),
            agent: DebugIgnore(Agent::new_with_config(agent_config)),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/rest/api/2/search", self.endpoint)
    }

    fn permalink(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.endpoint)
    }

    fn classify(&self, error: ureq::Error) -> IssueLookupError {
        match error {
            ureq::Error::StatusCode(status @ (401 | 403)) => IssueLookupError::Auth { status },
            ureq::Error::StatusCode(status @ 404) => IssueLookupError::NotFound { status },
            ureq::Error::StatusCode(status) => IssueLookupError::Status { status },
            ureq::Error::Timeout(_) => IssueLookupError::Timeout {
                timeout: self.timeout,
            },
            other => IssueLookupError::Network {
                endpoint: self.endpoint.clone(),
                source: Box::new(other),
            },
        }
    }
}

impl IssueTracker for JiraTracker {
    fn describe(&self) -> String {
        format!("JIRA at {}", self.endpoint)
    }

    fn find_issue(
        &self,
        signature: &FailureSignature,
    ) -> Result<Option<IssueInfo>, IssueLookupError> {
        let jql = search_jql(signature);
        let mut response = self
            .agent
            .get(self.search_url())
            .header("Authorization", self.authorization.as_str())
            .header("Accept", "application/json")
            .query("jql", &jql)
            .query("maxResults", "1")
            .query("fields", "summary,status,issuetype")
            .call()
            .map_err(|error| self.classify(error))?;

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|error| IssueLookupError::ReadResponse {
                source: Box::new(error),
            })?;
        let issue = parse_search_response(&body)?;
        Ok(issue.map(|issue| IssueInfo {
            url: self.permalink(&issue.key),
            id: issue.key,
            status: issue.fields.status.map(|s| s.name).unwrap_or_default(),
            summary: issue.fields.summary,
            issue_type: issue.fields.issuetype.map(|t| t.name).unwrap_or_default(),
        }))
    }
}

fn search_jql(signature: &FailureSignature) -> String {
    format!(r#"description ~ "{}" ORDER BY updated"#, signature.marker())
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<SearchIssue>,
}

#[derive(Debug, Deserialize)]
struct SearchIssue {
    key: String,
    fields: SearchFields,
}

#[derive(Debug, Deserialize)]
struct SearchFields {
    #[serde(default)]
    summary: String,
    status: Option<NamedField>,
    issuetype: Option<NamedField>,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    name: String,
}

fn parse_search_response(body: &str) -> Result<Option<SearchIssue>, IssueLookupError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|source| IssueLookupError::InvalidResponse { source })?;
    Ok(response.issues.into_iter().next())
}
