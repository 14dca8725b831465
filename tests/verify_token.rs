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

//! End-to-end token verification against a real leaf certificate.
//!
//! The certificate under `data/` carries the workflow URI in its SAN and a
//! commit digest in the Fulcio build-signer extension, like the ones Fulcio
//! issues to reusable workflows.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use slsa_delegator::environment::TrustedEnv;
use slsa_delegator::errors::Result;
use slsa_delegator::github::{
    Actor, GithubApiCapabilities, SelfHostedRunner, WorkflowJob, WorkflowRun,
};
use slsa_delegator::token::{SignedToken, SigningBundle, SlsaVersion};
use slsa_delegator::verify::{generate_predicate, write_predicate, TokenVerifier};
use slsa_delegator::workspace::Workspace;
use slsa_delegator::{SignatureVerifier, TokenError};

/// Base64 DER of a leaf certificate with
/// SAN `https://github.com/acme/tool/.github/workflows/build.yml@refs/tags/v1.0.0`
/// and build-signer digest `aaaabbbbccccddddeeeeffff0000111122223333`.
const LEAF_CERT_B64: &str = include_str!("data/leaf.der.b64");

struct AcceptAllVerifier;

#[async_trait]
impl SignatureVerifier for AcceptAllVerifier {
    async fn verify(&self, _bundle: &SigningBundle, _signed_payload: &[u8]) -> Result<()> {
        Ok(())
    }
}

struct StaticGithubClient {
    run: WorkflowRun,
}

#[async_trait]
impl GithubApiCapabilities for StaticGithubClient {
    async fn get_workflow_run(&self, _repository: &str, _run_id: u64) -> Result<WorkflowRun> {
        Ok(self.run.clone())
    }

    async fn list_jobs_for_run(&self, _repository: &str, _run_id: u64) -> Result<Vec<WorkflowJob>> {
        Ok(vec![])
    }

    async fn list_self_hosted_runners(&self, _repository: &str) -> Result<Vec<SelfHostedRunner>> {
        Ok(vec![])
    }
}

fn trusted_env() -> TrustedEnv {
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

fn claim_json(env: &TrustedEnv) -> Value {
    json!({
        "version": 1,
        "slsaVersion": "v1-rc1",
        "context": "SLSA delegator framework",
        "builder": {
            "audience": "delegator_generic_slsa3.yml",
            "runner_label": "ubuntu-latest",
            "private_repository": false
        },
        "github": {
            "actor_id": env.actor_id,
            "event_name": env.event_name,
            "event_payload_sha256": env.event_payload_sha256(),
            "ref": env.ref_,
            "ref_type": env.ref_type,
            "repository": env.repository,
            "repository_id": env.repository_id,
            "repository_owner_id": env.repository_owner_id,
            "run_attempt": env.run_attempt,
            "run_id": env.run_id,
            "run_number": env.run_number,
            "sha": env.sha,
            "workflow_ref": env.workflow_ref,
            "workflow_sha": env.workflow_sha
        },
        "runner": { "arch": "X64", "name": "GitHub Actions 2", "os": "Linux" },
        "image": { "os": "ubuntu22", "version": "20230217.1" },
        "tool": {
            "actions": { "build_artifacts": { "path": "./dist" } },
            "inputs": { "secret": "x", "public": "y" },
            "masked_inputs": ["secret"]
        }
    })
}

fn bundle_with_leaf() -> SigningBundle {
    serde_json::from_value(json!({
        "mediaType": "application/vnd.dev.sigstore.bundle+json;version=0.1",
        "verificationMaterial": {
            "x509CertificateChain": {
                "certificates": [{ "rawBytes": LEAF_CERT_B64.trim() }]
            }
        }
    }))
    .unwrap()
}

fn github_client() -> StaticGithubClient {
    StaticGithubClient {
        run: WorkflowRun {
            triggering_actor: Some(Actor { id: 999 }),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn verified_token_produces_masked_v1_predicate() -> anyhow::Result<()> {
    let env = trusted_env();
    let payload = serde_json::to_vec(&claim_json(&env))?;
    let token = SignedToken::encode(&bundle_with_leaf(), &payload)?;

    let verifier = TokenVerifier::new(Box::new(AcceptAllVerifier));
    let verified = verifier
        .verify_token(&token, "delegator_generic_slsa3.yml", &env)
        .await?;

    // Signer identity from the certificate.
    assert_eq!(
        verified.identity.uri,
        "https://github.com/acme/tool/.github/workflows/build.yml@refs/tags/v1.0.0"
    );
    assert_eq!(verified.identity.repository, "acme/tool");
    assert_eq!(verified.identity.ref_, "refs/tags/v1.0.0");
    assert_eq!(
        verified.identity.commit_sha,
        "aaaabbbbccccddddeeeeffff0000111122223333"
    );
    assert_eq!(verified.identity.tool_path, ".github/workflows/build.yml");

    // Masking: the predicate never sees the real value, the caller does.
    assert_eq!(verified.claim.tool.inputs["secret"], json!("***"));
    assert_eq!(verified.unmasked_claim.tool.inputs["secret"], json!("x"));

    let client = github_client();
    let predicate = generate_predicate(&verified, SlsaVersion::V1Rc1, &client, &env).await?;
    let value: Value = serde_json::from_str(&predicate)?;

    let inputs = &value["buildDefinition"]["externalParameters"]["inputs"];
    assert_eq!(inputs["secret"], json!("***"));
    assert_eq!(inputs["public"], json!("y"));

    let internal = &value["buildDefinition"]["internalParameters"];
    assert_eq!(internal["GITHUB_TRIGGERING_ACTOR_ID"], json!("999"));
    assert_eq!(internal["GITHUB_EVENT_PAYLOAD"]["ref"], json!("refs/heads/main"));

    assert_eq!(
        value["runDetails"]["builder"]["id"],
        json!("https://github.com/acme/tool/.github/workflows/build.yml@refs/tags/v1.0.0")
    );
    assert_eq!(
        value["runDetails"]["metadata"]["invocationId"],
        json!("https://github.com/acme/widget/actions/runs/3790385865/attempts/1")
    );
    Ok(())
}

#[tokio::test]
async fn v02_predicate_keeps_the_legacy_invocation_id() -> anyhow::Result<()> {
    let env = trusted_env();
    let payload = serde_json::to_vec(&claim_json(&env))?;
    let token = SignedToken::encode(&bundle_with_leaf(), &payload)?;

    let verifier = TokenVerifier::new(Box::new(AcceptAllVerifier));
    let verified = verifier
        .verify_token(&token, "delegator_generic_slsa3.yml", &env)
        .await?;

    let client = github_client();
    let predicate = generate_predicate(&verified, SlsaVersion::V02, &client, &env).await?;
    let value: Value = serde_json::from_str(&predicate)?;

    assert_eq!(value["metadata"]["buildInvocationId"], json!("3790385865-1"));
    assert_eq!(
        value["invocation"]["configSource"]["uri"],
        json!("git+https://github.com/acme/widget@refs/heads/main")
    );
    assert_eq!(
        value["invocation"]["configSource"]["entryPoint"],
        json!(".github/workflows/release.yml")
    );
    assert_eq!(value["invocation"]["parameters"]["inputs"]["secret"], json!("***"));
    Ok(())
}

#[tokio::test]
async fn tampered_context_is_rejected() -> anyhow::Result<()> {
    let env = trusted_env();
    let mut claim = claim_json(&env);
    claim["github"]["repository"] = json!("mallory/widget");
    let payload = serde_json::to_vec(&claim)?;
    let token = SignedToken::encode(&bundle_with_leaf(), &payload)?;

    let verifier = TokenVerifier::new(Box::new(AcceptAllVerifier));
    let err = verifier
        .verify_token(&token, "delegator_generic_slsa3.yml", &env)
        .await
        .expect_err("expected an error");
    assert!(matches!(err, TokenError::FieldMismatch { .. }));
    Ok(())
}

#[tokio::test]
async fn predicate_is_written_once_through_the_workspace() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let workspace = Workspace::new(dir.path());

    write_predicate(&workspace, Path::new("predicate.json"), r#"{"ok":true}"#)?;
    assert!(dir.path().join("predicate.json").exists());

    let err = write_predicate(&workspace, Path::new("predicate.json"), "{}")
        .expect_err("expected an error");
    assert!(matches!(err, TokenError::IOError(_)));

    let err = write_predicate(&workspace, Path::new("../escape.json"), "{}")
        .expect_err("expected an error");
    assert!(matches!(err, TokenError::UnsafePath { .. }));
    Ok(())
}
