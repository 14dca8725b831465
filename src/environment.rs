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

//! An immutable snapshot of the trusted execution context.
//!
//! The runtime hosting the build supplies these values; they are ground
//! truth against which the claim is checked. The snapshot is taken once and
//! threaded through validation and predicate construction, so no ambient
//! process state is read after construction.

use std::env;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::validate::validate_non_empty;
use crate::workspace::Workspace;

#[derive(Clone, Debug, Default)]
pub struct TrustedEnv {
    pub actor_id: String,
    pub event_name: String,
    pub ref_: String,
    pub ref_type: String,
    pub repository: String,
    pub repository_id: String,
    pub repository_owner_id: String,
    pub run_attempt: String,
    pub run_id: String,
    pub run_number: String,
    pub sha: String,
    pub workflow_ref: String,
    pub workflow_sha: String,
    /// Raw bytes of the trusted event payload file, read once through the
    /// workspace boundary at snapshot time.
    pub event_payload: Vec<u8>,
}

impl TrustedEnv {
    /// Takes the snapshot from the process environment, reading the event
    /// payload through the sandboxed workspace.
    pub fn from_env(workspace: &Workspace) -> Result<TrustedEnv> {
        let event_path = env_or_default("GITHUB_EVENT_PATH");
        validate_non_empty("GITHUB_EVENT_PATH", &event_path)?;
        let event_payload = workspace.read(event_path.as_ref())?;

        Ok(TrustedEnv {
            actor_id: env_or_default("GITHUB_ACTOR_ID"),
            event_name: env_or_default("GITHUB_EVENT_NAME"),
            ref_: env_or_default("GITHUB_REF"),
            ref_type: env_or_default("GITHUB_REF_TYPE"),
            repository: env_or_default("GITHUB_REPOSITORY"),
            repository_id: env_or_default("GITHUB_REPOSITORY_ID"),
            repository_owner_id: env_or_default("GITHUB_REPOSITORY_OWNER_ID"),
            run_attempt: env_or_default("GITHUB_RUN_ATTEMPT"),
            run_id: env_or_default("GITHUB_RUN_ID"),
            run_number: env_or_default("GITHUB_RUN_NUMBER"),
            sha: env_or_default("GITHUB_SHA"),
            workflow_ref: env_or_default("GITHUB_WORKFLOW_REF"),
            workflow_sha: env_or_default("GITHUB_WORKFLOW_SHA"),
            event_payload,
        })
    }

    /// Hex-encoded SHA-256 digest of the trusted event payload.
    pub fn event_payload_sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.event_payload))
    }

    /// The trusted event payload, parsed as JSON.
    pub fn event_payload_json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.event_payload)?)
    }
}

fn env_or_default(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

#[cfg(test)]
impl TrustedEnv {
    pub(crate) fn for_tests() -> TrustedEnv {
        TrustedEnv {
            actor_id: "64505099".into(),
            event_name: "workflow_dispatch".into(),
            ref_: "refs/heads/main".into(),
            ref_type: "branch".into(),
            repository: "acme/widget".into(),
            repository_id: "567955265".into(),
            repository_owner_id: "64505099".into(),
            run_attempt: "1".into(),
            run_id: "3790385865".into(),
            run_number: "200".into(),
            sha: "8cbf4d422367d8499d5980a837cb9cc8e1e67001".into(),
            workflow_ref: "acme/widget/.github/workflows/release.yml@refs/heads/main".into(),
            workflow_sha: "8cbf4d422367d8499d5980a837cb9cc8e1e67001".into(),
            event_payload: br#"{"inputs":null,"ref":"refs/heads/main"}"#.to_vec(),
        }
    }

    /// A claim context that agrees with this snapshot on every field.
    pub(crate) fn as_claim_context(&self) -> crate::token::GithubContext {
        crate::token::GithubContext {
            actor_id: self.actor_id.clone(),
            event_name: self.event_name.clone(),
            event_payload_sha256: self.event_payload_sha256(),
            ref_: self.ref_.clone(),
            ref_type: self.ref_type.clone(),
            repository: self.repository.clone(),
            repository_id: self.repository_id.clone(),
            repository_owner_id: self.repository_owner_id.clone(),
            run_attempt: self.run_attempt.clone(),
            run_id: self.run_id.clone(),
            run_number: self.run_number.clone(),
            sha: self.sha.clone(),
            workflow_ref: self.workflow_ref.clone(),
            workflow_sha: self.workflow_sha.clone(),
        }
    }
}
