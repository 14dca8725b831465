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

//! SLSA provenance v1.0-rc1 predicate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{trusted_parameters, TrustData, DELEGATOR_BUILD_TYPE};
use crate::environment::TrustedEnv;
use crate::errors::Result;
use crate::token::RawToken;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    pub build_definition: BuildDefinition,
    pub run_details: RunDetails,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDefinition {
    pub build_type: String,
    pub external_parameters: ExternalParameters,
    pub internal_parameters: Map<String, Value>,
    pub resolved_dependencies: Vec<ResolvedDependency>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalParameters {
    pub inputs: Map<String, Value>,
    pub vars: Map<String, Value>,
    pub source: ResolvedDependency,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedDependency {
    pub uri: String,
    pub digest: GitDigest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitDigest {
    pub git_commit: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunDetails {
    pub builder: Builder,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Builder {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub invocation_id: String,
}

/// Assembles the v1 predicate from a validated claim.
///
/// Tool inputs land in `externalParameters.inputs` (already masked by the
/// caller); the trusted context goes into `internalParameters`, with the
/// parsed event payload appended exactly once at the end, after the rest
/// of the structure is complete.
pub fn create_predicate(
    raw: &RawToken,
    trust: &TrustData,
    env: &TrustedEnv,
) -> Result<Predicate> {
    let mut predicate = Predicate {
        build_definition: BuildDefinition {
            build_type: DELEGATOR_BUILD_TYPE.to_owned(),
            external_parameters: ExternalParameters {
                inputs: raw.tool.inputs.clone(),
                // Variables are always empty for the delegator.
                vars: Map::new(),
                source: ResolvedDependency {
                    uri: trust.source_uri.clone(),
                    digest: GitDigest {
                        git_commit: trust.source_sha1.clone(),
                    },
                },
            },
            internal_parameters: trusted_parameters(&raw.github, &trust.triggering_actor_id),
            resolved_dependencies: vec![ResolvedDependency {
                uri: trust.source_uri.clone(),
                digest: GitDigest {
                    git_commit: trust.source_sha1.clone(),
                },
            }],
        },
        run_details: RunDetails {
            builder: Builder {
                id: trust.tool_uri.clone(),
            },
            metadata: Metadata {
                invocation_id: format!(
                    "https://github.com/{}/actions/runs/{}/attempts/{}",
                    raw.github.repository, raw.github.run_id, raw.github.run_attempt
                ),
            },
        },
    };

    // Contents of the event payload were pre-validated via its digest.
    predicate
        .build_definition
        .internal_parameters
        .insert("GITHUB_EVENT_PAYLOAD".to_owned(), env.event_payload_json()?);

    Ok(predicate)
}
