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

//! Resolution of the currently executing reusable workflow.
//!
//! Two strategies, tried in order: decode a freshly minted OIDC identity
//! token, or cross-reference the triggering run's referenced-workflow list
//! when OIDC is unavailable.

use std::collections::HashSet;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as base64url, Engine as _};
use serde::Deserialize;
use tracing::debug;

use crate::errors::{Result, TokenError};
use crate::github::GithubApiCapabilities;

/// The label GitHub attaches to jobs scheduled on self-hosted runners.
pub const SELF_HOSTED_LABEL: &str = "self-hosted";

/// The identity of the reusable workflow that is currently executing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowIdentity {
    /// `owner/repo`.
    pub repository: String,
    pub ref_: String,
    /// Workflow path inside the repository.
    pub workflow: String,
}

/// Issues OIDC identity tokens scoped to an audience.
#[async_trait]
pub trait IdTokenProvider: Send + Sync {
    async fn id_token(&self, audience: &str) -> Result<String>;
}

/// Requests identity tokens from the Actions runtime's token endpoint.
pub struct ActionsIdTokenProvider {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct IdTokenResponse {
    value: String,
}

impl ActionsIdTokenProvider {
    pub fn new() -> ActionsIdTokenProvider {
        ActionsIdTokenProvider {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ActionsIdTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdTokenProvider for ActionsIdTokenProvider {
    async fn id_token(&self, audience: &str) -> Result<String> {
        let request_url = std::env::var("ACTIONS_ID_TOKEN_REQUEST_URL")
            .map_err(|_| TokenError::GithubApiError("OIDC token endpoint not available".into()))?;
        let request_token = std::env::var("ACTIONS_ID_TOKEN_REQUEST_TOKEN")
            .map_err(|_| TokenError::GithubApiError("OIDC request token not available".into()))?;

        let url = format!("{request_url}&audience={audience}");
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "slsa-delegator")
            .bearer_auth(request_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TokenError::GithubApiError(format!(
                "OIDC token request: {}",
                response.status()
            )));
        }
        let body: IdTokenResponse = response.json().await?;
        Ok(body.value)
    }
}

/// The claims we care about in the Actions OIDC token.
#[derive(Debug, Deserialize)]
pub struct OidcClaims {
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub job_workflow_ref: Option<String>,
}

/// Decodes the middle segment of a JWT without verifying the signature.
/// The token was freshly minted by the trusted runtime, so no client-side
/// signature check is needed.
pub fn decode_id_token(token: &str) -> Result<OidcClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::MalformedClaim(format!(
            "OIDC token has {} segments, expected 3",
            parts.len()
        )));
    }
    let payload = base64url.decode(parts[1])?;
    serde_json::from_slice(&payload).map_err(|e| TokenError::MalformedClaim(e.to_string()))
}

/// OIDC strategy: resolve the current reusable workflow from the
/// `job_workflow_ref` claim of an identity token minted for `audience`.
pub async fn detect_from_oidc(
    provider: &dyn IdTokenProvider,
    audience: &str,
) -> Result<WorkflowIdentity> {
    let token = provider.id_token(audience).await?;
    let claims = decode_id_token(&token)?;

    if claims.aud.as_deref() != Some(audience) {
        return Err(TokenError::AudienceMismatch);
    }
    let job_workflow_ref = claims
        .job_workflow_ref
        .filter(|r| !r.is_empty())
        .ok_or(TokenError::MissingWorkflowRef)?;

    split_job_workflow_ref(&job_workflow_ref)
}

/// Splits `owner/repo/path/to/workflow.yml@<ref>` on the last `@`, then
/// takes the first two path segments as the repository.
fn split_job_workflow_ref(job_workflow_ref: &str) -> Result<WorkflowIdentity> {
    let invalid = || TokenError::InvalidUriFormat {
        uri: job_workflow_ref.into(),
    };

    let (path, ref_) = job_workflow_ref
        .rsplit_once('@')
        .ok_or(TokenError::MissingWorkflowRef)?;
    let mut segments = path.splitn(3, '/');
    let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let workflow = segments.next().unwrap_or_default();

    Ok(WorkflowIdentity {
        repository: format!("{owner}/{repo}"),
        ref_: ref_.to_owned(),
        workflow: workflow.to_owned(),
    })
}

/// Context-fallback strategy: resolve the current reusable workflow from
/// the triggering run's `referenced_workflows` list.
///
/// For pull-request-like events the identity is taken directly from the
/// head repository and head SHA. Otherwise the references are filtered to
/// the trusted tooling repository and all matches must agree.
pub async fn detect_from_context(
    client: &dyn GithubApiCapabilities,
    repository: &str,
    run_id: u64,
    trusted_repository: &str,
) -> Result<WorkflowIdentity> {
    let run = client.get_workflow_run(repository, run_id).await?;

    if run.event == "pull_request" || run.event == "merge_group" {
        let head_repository = run.head_repository.ok_or(TokenError::NoReusableWorkflow)?;
        return Ok(WorkflowIdentity {
            repository: head_repository.full_name,
            ref_: run.head_sha,
            workflow: run.path.unwrap_or_default(),
        });
    }

    let referenced = run
        .referenced_workflows
        .ok_or(TokenError::NoReusableWorkflow)?;

    let mut identity: Option<WorkflowIdentity> = None;
    for reference in &referenced {
        // The referenced path carries a trailing `@<version>` pin.
        let path = reference.path.split('@').next().unwrap_or_default();
        let mut segments = path.splitn(3, '/');
        let (Some(owner), Some(repo)) = (segments.next(), segments.next()) else {
            continue;
        };
        if format!("{owner}/{repo}") != trusted_repository {
            continue;
        }

        // Was the workflow invoked by digest? Then there is no ref to pin.
        let ref_ = reference
            .ref_
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or(TokenError::MissingWorkflowRef)?;
        let candidate = WorkflowIdentity {
            repository: trusted_repository.to_owned(),
            ref_,
            workflow: segments.next().unwrap_or_default().to_owned(),
        };

        // Multiple invocations of the trusted reusable workflow must agree
        // on repository and ref.
        match &identity {
            Some(existing)
                if existing.repository != candidate.repository
                    || existing.ref_ != candidate.ref_ =>
            {
                return Err(TokenError::AmbiguousWorkflowReference);
            }
            _ => identity = Some(candidate),
        }
    }

    identity.ok_or(TokenError::NoReusableWorkflow)
}

/// Tries the OIDC strategy first and falls back to the run context when no
/// identity token can be obtained.
///
/// The fallback covers provider unavailability only. Once a token was
/// minted, any defect in it (wrong audience, missing or malformed
/// `job_workflow_ref`) is terminal.
pub async fn detect_workflow(
    provider: &dyn IdTokenProvider,
    client: &dyn GithubApiCapabilities,
    audience: &str,
    repository: &str,
    run_id: u64,
    trusted_repository: &str,
) -> Result<WorkflowIdentity> {
    match detect_from_oidc(provider, audience).await {
        Ok(identity) => Ok(identity),
        Err(err @ (TokenError::GithubApiError(_) | TokenError::ReqwestError(_))) => {
            debug!(%err, "OIDC detection unavailable, falling back to run context");
            detect_from_context(client, repository, run_id, trusted_repository).await
        }
        Err(err) => Err(err),
    }
}

/// Confirms that no job of the run executes on a self-hosted runner.
///
/// The job list and the repository's self-hosted runner labels are fetched
/// concurrently; the first failure wins.
pub async fn ensure_github_hosted_runners(
    client: &dyn GithubApiCapabilities,
    repository: &str,
    run_id: u64,
) -> Result<()> {
    let (jobs, runners) = tokio::try_join!(
        client.list_jobs_for_run(repository, run_id),
        client.list_self_hosted_runners(repository),
    )?;

    let mut self_hosted: HashSet<&str> = runners
        .iter()
        .flat_map(|runner| runner.labels.iter().map(|label| label.name.as_str()))
        .collect();
    self_hosted.insert(SELF_HOSTED_LABEL);

    let offending: Vec<&str> = jobs
        .iter()
        .filter(|job| job.labels.iter().any(|l| self_hosted.contains(l.as_str())))
        .map(|job| job.name.as_str())
        .collect();

    if !offending.is_empty() {
        return Err(TokenError::SelfHostedRunner {
            jobs: offending.join(", "),
        });
    }
    Ok(())
}
