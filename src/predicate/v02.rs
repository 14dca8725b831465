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

//! SLSA provenance v0.2 predicate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{trusted_parameters, TrustData, DELEGATOR_BUILD_TYPE};
use crate::errors::Result;
use crate::token::RawToken;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    pub builder: Builder,
    pub build_type: String,
    pub invocation: Invocation,
    pub metadata: Metadata,
    pub materials: Vec<Material>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Builder {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub config_source: ConfigSource,
    pub parameters: Parameters,
    pub environment: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSource {
    pub uri: String,
    pub digest: Sha1Digest,
    pub entry_point: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sha1Digest {
    pub sha1: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameters {
    pub inputs: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub build_invocation_id: String,
    pub completeness: Completeness,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completeness {
    pub parameters: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Material {
    pub uri: String,
    pub digest: Sha1Digest,
}

/// Assembles the v0.2 predicate from a validated claim.
///
/// The same information as the v1 schema, flattened: tool inputs under
/// `invocation.parameters`, trusted context under `invocation.environment`,
/// the trigger repository as both config source and sole material.
///
/// `buildInvocationId` keeps the legacy `<run_id>-<run_attempt>` format;
/// registry consumers validate it against the environment fields, so it
/// must not be unified with the v1 URL form.
pub fn create_predicate(raw: &RawToken, trust: &TrustData) -> Result<Predicate> {
    Ok(Predicate {
        builder: Builder {
            id: trust.tool_uri.clone(),
        },
        build_type: DELEGATOR_BUILD_TYPE.to_owned(),
        invocation: Invocation {
            config_source: ConfigSource {
                uri: trust.trigger_uri.clone(),
                digest: Sha1Digest {
                    sha1: raw.github.sha.clone(),
                },
                entry_point: trust.workflow_path.clone(),
            },
            parameters: Parameters {
                inputs: raw.tool.inputs.clone(),
            },
            environment: trusted_parameters(&raw.github, &trust.triggering_actor_id),
        },
        metadata: Metadata {
            build_invocation_id: format!("{}-{}", raw.github.run_id, raw.github.run_attempt),
            completeness: Completeness { parameters: true },
        },
        materials: vec![Material {
            uri: trust.trigger_uri.clone(),
            digest: Sha1Digest {
                sha1: raw.github.sha.clone(),
            },
        }],
    })
}
