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

//! The two-segment provenance token and its claim payload.
//!
//! A token is `base64(bundle) + "." + base64(claim)`: the first segment is
//! the Sigstore signing bundle used to verify the signature over the second
//! segment, which carries the JSON claim emitted by the delegator workflow.

use std::fmt::Display;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, TokenError};

/// The only supported claim protocol version.
pub const TOKEN_VERSION: u64 = 1;

/// Fixed tag identifying the protocol a claim was signed for.
pub const DELEGATOR_CONTEXT: &str = "SLSA delegator framework";

/// Supported provenance predicate schema versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlsaVersion {
    #[serde(rename = "1.0-rc1", alias = "v1-rc1")]
    V1Rc1,
    #[serde(rename = "0.2")]
    V02,
}

impl Display for SlsaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SlsaVersion::V1Rc1 => "1.0-rc1",
            SlsaVersion::V02 => "0.2",
        })
    }
}

impl FromStr for SlsaVersion {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1.0-rc1" | "v1-rc1" => Ok(SlsaVersion::V1Rc1),
            "0.2" => Ok(SlsaVersion::V02),
            other => Err(TokenError::FieldNotAllowed {
                name: "slsaVersion".into(),
                actual: other.into(),
                allowed: "1.0-rc1,0.2".into(),
            }),
        }
    }
}

/// Trusted execution-context fields embedded in the claim.
///
/// Each field is cross-checked against the corresponding value from the
/// trusted environment before the claim is accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubContext {
    pub actor_id: String,
    pub event_name: String,
    pub event_payload_sha256: String,
    #[serde(rename = "ref")]
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
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuilderClaim {
    pub audience: String,
    pub runner_label: String,
    pub private_repository: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunnerContext {
    pub arch: String,
    pub name: String,
    pub os: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImageContext {
    pub os: String,
    pub version: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuildArtifacts {
    pub path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolActions {
    pub build_artifacts: BuildArtifacts,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolClaim {
    pub actions: ToolActions,
    // NOTE: reusable workflows only support inputs of type boolean, number,
    // or string.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    // Input names whose values must be redacted in the provenance.
    #[serde(default)]
    pub masked_inputs: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutClaim {
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceClaim {
    #[serde(default)]
    pub checkout: CheckoutClaim,
}

/// The decoded claim payload of a provenance token.
///
/// The shape is validated exhaustively at parse time; unknown top-level
/// fields are rejected rather than probed at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawToken {
    pub version: u64,
    #[serde(rename = "slsaVersion")]
    pub slsa_version: SlsaVersion,
    pub context: String,
    pub builder: BuilderClaim,
    pub github: GithubContext,
    pub runner: RunnerContext,
    pub image: ImageContext,
    pub tool: ToolClaim,
    // The reusable workflow may overwrite the commit to build; see the
    // source-URI derivation in the predicate module.
    #[serde(default)]
    pub source: SourceClaim,
}

/// A certificate in a [`SigningBundle`], as base64-encoded DER.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleCertificate {
    pub raw_bytes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X509CertificateChain {
    #[serde(default)]
    pub certificates: Vec<BundleCertificate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMaterial {
    #[serde(default)]
    pub x509_certificate_chain: Option<X509CertificateChain>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The Sigstore signing bundle carried in the first token segment.
///
/// Only the certificate chain is modeled; the signature content and
/// transparency log material are kept opaque and handed as-is to the
/// external signature verifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub verification_material: Option<VerificationMaterial>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A decoded, not-yet-verified provenance token.
///
/// The token is ephemeral: it is parsed once and discarded after the claim
/// has been extracted and verified.
#[derive(Clone, Debug)]
pub struct SignedToken {
    pub bundle: SigningBundle,
    payload_b64: String,
}

impl SignedToken {
    /// Splits the token on `.` and decodes both segments.
    pub fn decode(token: &str) -> Result<SignedToken> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 2 {
            return Err(TokenError::MalformedToken { parts: parts.len() });
        }

        let bundle_bytes = base64.decode(parts[0])?;
        let bundle: SigningBundle = serde_json::from_slice(&bundle_bytes)?;

        // Decode the payload eagerly so a corrupt second segment is caught
        // here rather than after signature verification.
        base64.decode(parts[1])?;

        Ok(SignedToken {
            bundle,
            payload_b64: parts[1].to_owned(),
        })
    }

    /// Inverse of [`SignedToken::decode`]. No escaping is needed since the
    /// base64 alphabet excludes `.`.
    pub fn encode(bundle: &SigningBundle, payload: &[u8]) -> Result<String> {
        let bundle_json = serde_json::to_vec(bundle)?;
        Ok(format!(
            "{}.{}",
            base64.encode(bundle_json),
            base64.encode(payload)
        ))
    }

    /// The bytes covered by the bundle's signature: the base64 text of the
    /// payload segment, not the decoded payload.
    pub fn signed_payload(&self) -> &[u8] {
        self.payload_b64.as_bytes()
    }

    /// The decoded claim payload bytes.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(base64.decode(&self.payload_b64)?)
    }

    /// Parses the claim payload into a [`RawToken`].
    pub fn claim(&self) -> Result<RawToken> {
        let payload = self.payload()?;
        serde_json::from_slice(&payload)
            .map_err(|e| TokenError::MalformedClaim(e.to_string()))
    }
}
