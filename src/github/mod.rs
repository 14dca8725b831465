//
// Copyright 2023 The SLSA Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minimal GitHub Actions REST API client.
//!
//! Only the lookups the trust pipeline needs are modeled: the triggering
//! workflow run, its jobs, and the repository's self-hosted runners.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{Result, TokenError};

/// Default public GitHub API root.
pub const GITHUB_API_ROOT: &str = "https://api.github.com";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Actor {
    pub id: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReferencedWorkflow {
    /// `owner/repo/path/to/workflow.yml@<version>`.
    pub path: String,
    #[serde(default, rename = "ref")]
    pub ref_: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorkflowRun {
    pub event: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub head_repository: Option<Repository>,
    #[serde(default)]
    pub repository: Option<Repository>,
    #[serde(default)]
    pub triggering_actor: Option<Actor>,
    /// `None` when the API omits the field entirely, as opposed to an
    /// empty list of references.
    #[serde(default)]
    pub referenced_workflows: Option<Vec<ReferencedWorkflow>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WorkflowJob {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunnerLabel {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SelfHostedRunner {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<RunnerLabel>,
}

#[derive(Deserialize)]
struct JobsResponse {
    jobs: Vec<WorkflowJob>,
}

#[derive(Deserialize)]
struct RunnersResponse {
    runners: Vec<SelfHostedRunner>,
}

/// The source-control API lookups consumed by the trust pipeline.
#[async_trait]
pub trait GithubApiCapabilities: Send + Sync {
    async fn get_workflow_run(&self, repository: &str, run_id: u64) -> Result<WorkflowRun>;
    async fn list_jobs_for_run(&self, repository: &str, run_id: u64) -> Result<Vec<WorkflowJob>>;
    async fn list_self_hosted_runners(&self, repository: &str) -> Result<Vec<SelfHostedRunner>>;
}

/// Token-authenticated client for the GitHub REST API.
pub struct GithubApiClient {
    client: reqwest::Client,
    api_root: String,
    token: String,
}

impl GithubApiClient {
    pub fn new(token: impl Into<String>) -> GithubApiClient {
        GithubApiClient::with_api_root(GITHUB_API_ROOT, token)
    }

    pub fn with_api_root(api_root: impl Into<String>, token: impl Into<String>) -> GithubApiClient {
        GithubApiClient {
            client: reqwest::Client::new(),
            api_root: api_root.into(),
            token: token.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_root, path);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, "slsa-delegator")
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TokenError::GithubApiError(format!(
                "{}: {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GithubApiCapabilities for GithubApiClient {
    async fn get_workflow_run(&self, repository: &str, run_id: u64) -> Result<WorkflowRun> {
        self.get_json(&format!("/repos/{repository}/actions/runs/{run_id}"))
            .await
    }

    async fn list_jobs_for_run(&self, repository: &str, run_id: u64) -> Result<Vec<WorkflowJob>> {
        let response: JobsResponse = self
            .get_json(&format!("/repos/{repository}/actions/runs/{run_id}/jobs"))
            .await?;
        Ok(response.jobs)
    }

    async fn list_self_hosted_runners(&self, repository: &str) -> Result<Vec<SelfHostedRunner>> {
        let response: RunnersResponse = self
            .get_json(&format!("/repos/{repository}/actions/runners"))
            .await?;
        Ok(response.runners)
    }
}
