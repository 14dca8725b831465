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

//! The token trust pipeline.
//!
//! Drives the full decision: decode the token, check the bundle signature,
//! validate every claim field against the trusted environment, mask
//! sensitive inputs, extract the signer identity, and only then build and
//! persist the provenance predicate.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::cert::CertificateIdentity;
use crate::environment::TrustedEnv;
use crate::errors::{Result, TokenError};
use crate::github::GithubApiCapabilities;
use crate::predicate::{v02, v1, TrustData};
use crate::token::{RawToken, SignedToken, SigningBundle, SlsaVersion, DELEGATOR_CONTEXT, TOKEN_VERSION};
use crate::validate::{
    mask_inputs, validate_field, validate_field_any_of, validate_github_context,
    validate_non_empty,
};
use crate::workspace::Workspace;

/// Runner labels a claim is allowed to carry. Anything else, including
/// self-hosted labels, is rejected.
pub const RUNNER_LABELS: &[&str] = &["ubuntu-latest"];

/// Checks that the bundle's signature covers `signed_payload` and chains up
/// to a trusted root. Implementations wrap an external Sigstore client.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, bundle: &SigningBundle, signed_payload: &[u8]) -> Result<()>;
}

/// The outcome of a successful verification.
#[derive(Clone, Debug)]
pub struct VerifiedToken {
    /// The validated claim, with sensitive inputs masked. Predicates are
    /// built from this.
    pub claim: RawToken,
    /// The claim as signed, inputs unmasked. Callers that dispatch the
    /// build need the real input values.
    pub unmasked_claim: RawToken,
    /// Identity of the tool workflow, from the signing certificate.
    pub identity: CertificateIdentity,
}

/// Verifies provenance tokens against a trusted environment snapshot.
pub struct TokenVerifier {
    signature_verifier: Box<dyn SignatureVerifier>,
}

impl TokenVerifier {
    pub fn new(signature_verifier: Box<dyn SignatureVerifier>) -> TokenVerifier {
        TokenVerifier { signature_verifier }
    }

    /// Runs the whole trust decision for one token.
    ///
    /// Fail-fast: the first violated check aborts verification, and nothing
    /// is produced from a token that fails any check.
    pub async fn verify_token(
        &self,
        unverified_token: &str,
        recipient: &str,
        env: &TrustedEnv,
    ) -> Result<VerifiedToken> {
        let signed = SignedToken::decode(unverified_token)?;

        // Signature first: an unsigned claim must not even be parsed.
        self.signature_verifier
            .verify(&signed.bundle, signed.signed_payload())
            .await
            .map_err(|err| {
                error!(%err, "bundle signature verification failed");
                TokenError::SignatureVerificationFailed
            })?;

        let unmasked_claim = signed.claim()?;
        debug!(recipient, "verifying claim");

        validate_field("version", &unmasked_claim.version, &TOKEN_VERSION)?;
        validate_field(
            "context",
            &unmasked_claim.context,
            &DELEGATOR_CONTEXT.to_owned(),
        )?;
        // The intended recipient of the token.
        validate_field(
            "builder.audience",
            &unmasked_claim.builder.audience,
            &recipient.to_owned(),
        )?;
        validate_field_any_of(
            "builder.runner_label",
            &unmasked_claim.builder.runner_label.as_str(),
            RUNNER_LABELS,
        )?;
        validate_github_context(&unmasked_claim.github, env)?;
        validate_non_empty(
            "tool.actions.build_artifacts.path",
            &unmasked_claim.tool.actions.build_artifacts.path,
        )?;

        let mut claim = unmasked_claim.clone();
        claim.tool.inputs = mask_inputs(&claim.tool.inputs, &claim.tool.masked_inputs)?;

        let identity = CertificateIdentity::extract(&signed.bundle)?;
        debug!(uri = %identity.uri, "extracted signer identity");

        Ok(VerifiedToken {
            claim,
            unmasked_claim,
            identity,
        })
    }
}

/// Builds the provenance predicate for a verified token and serializes it.
///
/// The masked claim is used throughout, so sensitive input values never
/// reach the predicate.
pub async fn generate_predicate(
    verified: &VerifiedToken,
    version: SlsaVersion,
    client: &dyn GithubApiCapabilities,
    env: &TrustedEnv,
) -> Result<String> {
    let trust = TrustData::collect(client, &verified.claim, &verified.identity.uri).await?;
    let serialized = match version {
        SlsaVersion::V1Rc1 => {
            serde_json::to_string(&v1::create_predicate(&verified.claim, &trust, env)?)?
        }
        SlsaVersion::V02 => serde_json::to_string(&v02::create_predicate(&verified.claim, &trust)?)?,
    };
    Ok(serialized)
}

/// Persists a serialized predicate through the sandboxed workspace.
/// Write-once: an existing file fails the run rather than being replaced.
pub fn write_predicate(workspace: &Workspace, path: &Path, predicate: &str) -> Result<()> {
    workspace.write_new(path, predicate.as_bytes())
}
