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

//! Provenance predicate construction.
//!
//! Two schema-specific builders share the same trust inputs and differ only
//! in field layout. The version-agnostic pieces live here: source and
//! trigger URI derivation, commit digest selection, and the triggering
//! actor lookup.

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::{Result, TokenError};
use crate::github::GithubApiCapabilities;
use crate::token::{GithubContext, RawToken};

pub mod v02;
pub mod v1;

/// Build type identifying the delegator as the builder.
pub const DELEGATOR_BUILD_TYPE: &str =
    "https://github.com/slsa-framework/slsa-github-generator/delegator-generic@v0";

const GIT_URI_PREFIX: &str = "git+https://github.com/";
const SHA1_HEX_LEN: usize = 40;

/// Version-agnostic trust inputs shared by both predicate builders.
///
/// Everything here is derived from the already validated claim, except the
/// triggering actor id which comes from the workflow-run API lookup.
#[derive(Clone, Debug)]
pub struct TrustData {
    /// Identity URI of the tool reusable workflow, from the signing
    /// certificate.
    pub tool_uri: String,
    pub triggering_actor_id: String,
    pub source_uri: String,
    pub source_sha1: String,
    pub trigger_uri: String,
    pub workflow_path: String,
}

impl TrustData {
    /// Derives the trust inputs for a validated claim, resolving the
    /// triggering actor through the source-control API.
    pub async fn collect(
        client: &dyn GithubApiCapabilities,
        raw: &RawToken,
        tool_uri: impl Into<String>,
    ) -> Result<TrustData> {
        let triggering_actor_id = resolve_triggering_actor_id(client, &raw.github).await?;
        Ok(TrustData {
            tool_uri: tool_uri.into(),
            triggering_actor_id,
            source_uri: source_uri(raw)?,
            source_sha1: source_sha1(raw)?,
            trigger_uri: trigger_uri(&raw.github)?,
            workflow_path: workflow_path(&raw.github)?,
        })
    }
}

/// URI of the repository that was checked out and built.
///
/// The tool workflow may overwrite the commit to build; when it does, the
/// claimed ref no longer describes the built commit and is omitted.
pub fn source_uri(raw: &RawToken) -> Result<String> {
    if raw.github.repository.is_empty() {
        return Err(TokenError::EmptyField {
            name: "github.repository".into(),
        });
    }
    if raw.source.checkout.sha1.is_some() {
        return Ok(format!("{GIT_URI_PREFIX}{}", raw.github.repository));
    }
    Ok(with_optional_ref(&raw.github.repository, &raw.github.ref_))
}

/// URI of the repository that triggered the run, with its ref when known.
pub fn trigger_uri(github: &GithubContext) -> Result<String> {
    if github.repository.is_empty() {
        return Err(TokenError::EmptyField {
            name: "github.repository".into(),
        });
    }
    Ok(with_optional_ref(&github.repository, &github.ref_))
}

fn with_optional_ref(repository: &str, ref_: &str) -> String {
    if ref_.is_empty() {
        format!("{GIT_URI_PREFIX}{repository}")
    } else {
        format!("{GIT_URI_PREFIX}{repository}@{ref_}")
    }
}

/// The commit digest of the built source. An explicit checkout commit from
/// the tool workflow takes precedence over the trigger commit.
pub fn source_sha1(raw: &RawToken) -> Result<String> {
    let sha1 = raw
        .source
        .checkout
        .sha1
        .as_deref()
        .unwrap_or(&raw.github.sha);
    validate_sha1(sha1)?;
    Ok(sha1.to_owned())
}

fn validate_sha1(sha1: &str) -> Result<()> {
    if sha1.len() != SHA1_HEX_LEN || !sha1.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TokenError::InvalidSha1(sha1.into()));
    }
    Ok(())
}

/// Workflow path inside the trigger repository, from `workflow_ref` with
/// the repository prefix and ref suffix stripped.
pub fn workflow_path(github: &GithubContext) -> Result<String> {
    let path = github
        .workflow_ref
        .strip_prefix(&format!("{}/", github.repository))
        .ok_or_else(|| TokenError::PathDerivation {
            uri: github.workflow_ref.clone(),
        })?;
    Ok(path.split('@').next().unwrap_or_default().to_owned())
}

/// The triggering actor id comes from the workflow-run API lookup. The
/// run_id was validated against the trusted environment, so the lookup is
/// as trustworthy as the API itself. The claimed actor id is the fallback
/// when the API omits the actor.
pub async fn resolve_triggering_actor_id(
    client: &dyn GithubApiCapabilities,
    github: &GithubContext,
) -> Result<String> {
    let run_id: u64 = github
        .run_id
        .parse()
        .map_err(|_| TokenError::MalformedClaim(format!("non-numeric run_id: {}", github.run_id)))?;
    let run = client.get_workflow_run(&github.repository, run_id).await?;

    match run.triggering_actor {
        Some(actor) => Ok(actor.id.to_string()),
        None => {
            debug!("workflow run carries no triggering actor, using claimed actor id");
            Ok(github.actor_id.clone())
        }
    }
}

/// The trusted context fields both schemas record, in a stable order.
pub(crate) fn trusted_parameters(
    github: &GithubContext,
    triggering_actor_id: &str,
) -> Map<String, Value> {
    let mut parameters = Map::new();
    let mut put = |name: &str, value: &str| {
        parameters.insert(name.to_owned(), Value::String(value.to_owned()));
    };
    put("GITHUB_ACTOR_ID", &github.actor_id);
    put("GITHUB_EVENT_NAME", &github.event_name);
    put("GITHUB_REF", &github.ref_);
    put("GITHUB_REF_TYPE", &github.ref_type);
    put("GITHUB_REPOSITORY", &github.repository);
    put("GITHUB_REPOSITORY_ID", &github.repository_id);
    put("GITHUB_REPOSITORY_OWNER_ID", &github.repository_owner_id);
    put("GITHUB_RUN_ATTEMPT", &github.run_attempt);
    put("GITHUB_RUN_ID", &github.run_id);
    put("GITHUB_RUN_NUMBER", &github.run_number);
    put("GITHUB_SHA", &github.sha);
    put("GITHUB_TRIGGERING_ACTOR_ID", triggering_actor_id);
    put("GITHUB_WORKFLOW_REF", &github.workflow_ref);
    put("GITHUB_WORKFLOW_SHA", &github.workflow_sha);
    parameters
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::environment::TrustedEnv;
    use crate::token::RawToken;
    use serde_json::json;

    /// A raw claim whose github context agrees with [`TrustedEnv::for_tests`].
    pub(crate) fn sample_raw_token(env: &TrustedEnv) -> RawToken {
        serde_json::from_value(json!({
            "version": 1,
            "slsaVersion": "1.0-rc1",
            "context": "SLSA delegator framework",
            "builder": {
                "audience": "delegator_generic_slsa3.yml",
                "runner_label": "ubuntu-latest",
                "private_repository": false
            },
            "github": serde_json::to_value(env.as_claim_context()).unwrap(),
            "runner": { "arch": "X64", "name": "GitHub Actions 2", "os": "Linux" },
            "image": { "os": "ubuntu22", "version": "20230217.1" },
            "tool": {
                "actions": { "build_artifacts": { "path": "./dist" } },
                "inputs": { "secret": "x", "public": "y" },
                "masked_inputs": ["secret"]
            }
        }))
        .unwrap()
    }

    pub(crate) fn sample_trust_data(raw: &RawToken) -> TrustData {
        TrustData {
            tool_uri:
                "https://github.com/acme/tool/.github/workflows/build.yml@refs/tags/v1.0.0".into(),
            triggering_actor_id: "64505099".into(),
            source_uri: source_uri(raw).unwrap(),
            source_sha1: source_sha1(raw).unwrap(),
            trigger_uri: trigger_uri(&raw.github).unwrap(),
            workflow_path: workflow_path(&raw.github).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::sample_raw_token;
    use super::*;
    use crate::environment::TrustedEnv;
    use crate::github::test::MockGithubClient;
    use crate::github::{Actor, WorkflowRun};
    use crate::token::SlsaVersion;
    use serde_json::json;

    fn raw() -> RawToken {
        sample_raw_token(&TrustedEnv::for_tests())
    }

    #[test]
    fn source_uri_includes_the_ref() -> anyhow::Result<()> {
        assert_eq!(
            source_uri(&raw())?,
            "git+https://github.com/acme/widget@refs/heads/main"
        );
        Ok(())
    }

    #[test]
    fn source_uri_omits_the_ref_for_explicit_checkouts() -> anyhow::Result<()> {
        let mut raw = raw();
        raw.source.checkout.sha1 =
            Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into());
        assert_eq!(source_uri(&raw)?, "git+https://github.com/acme/widget");
        Ok(())
    }

    #[test]
    fn source_uri_requires_a_repository() {
        let mut raw = raw();
        raw.github.repository = String::new();
        let err = source_uri(&raw).expect_err("expected an error");
        assert!(matches!(err, TokenError::EmptyField { .. }));
    }

    #[test]
    fn checkout_sha1_takes_precedence() -> anyhow::Result<()> {
        let mut raw = raw();
        raw.source.checkout.sha1 =
            Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into());
        assert_eq!(
            source_sha1(&raw)?,
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        Ok(())
    }

    #[test]
    fn malformed_sha1_is_rejected() {
        let mut raw = raw();
        raw.source.checkout.sha1 = Some("not-a-sha".into());
        let err = source_sha1(&raw).expect_err("expected an error");
        assert!(matches!(err, TokenError::InvalidSha1(_)));

        let mut raw = self::raw();
        raw.source.checkout.sha1 = Some("8cbf4d42".into());
        assert!(source_sha1(&raw).is_err());
    }

    #[test]
    fn workflow_path_strips_repository_and_ref() -> anyhow::Result<()> {
        assert_eq!(
            workflow_path(&raw().github)?,
            ".github/workflows/release.yml"
        );
        Ok(())
    }

    #[test]
    fn workflow_path_requires_the_repository_prefix() {
        let mut raw = raw();
        raw.github.workflow_ref = "fork/widget/wf.yml@refs/heads/main".into();
        let err = workflow_path(&raw.github).expect_err("expected an error");
        assert!(matches!(err, TokenError::PathDerivation { .. }));
    }

    #[tokio::test]
    async fn triggering_actor_comes_from_the_api() -> anyhow::Result<()> {
        let client = MockGithubClient {
            run: WorkflowRun {
                triggering_actor: Some(Actor { id: 123456 }),
                ..Default::default()
            },
            ..Default::default()
        };
        let id = resolve_triggering_actor_id(&client, &raw().github).await?;
        assert_eq!(id, "123456");
        Ok(())
    }

    #[tokio::test]
    async fn triggering_actor_falls_back_to_the_claim() -> anyhow::Result<()> {
        let client = MockGithubClient::default();
        let id = resolve_triggering_actor_id(&client, &raw().github).await?;
        assert_eq!(id, "64505099");
        Ok(())
    }

    #[test]
    fn trusted_parameters_record_the_full_context() {
        let parameters = trusted_parameters(&raw().github, "123456");
        assert_eq!(parameters.len(), 14);
        assert_eq!(parameters["GITHUB_REPOSITORY"], json!("acme/widget"));
        assert_eq!(parameters["GITHUB_TRIGGERING_ACTOR_ID"], json!("123456"));
    }

    #[test]
    fn sample_claim_is_v1() {
        assert_eq!(raw().slsa_version, SlsaVersion::V1Rc1);
    }
}
