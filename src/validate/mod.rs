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

//! Claim validation: field checks against the trusted environment, and
//! masking of sensitive workflow inputs.

use std::fmt::Display;

use serde_json::{Map, Value};

use crate::environment::TrustedEnv;
use crate::errors::{Result, TokenError};
use crate::token::GithubContext;

/// The sentinel GitHub uses for encrypted secrets and masked values.
pub const MASKED_VALUE: &str = "***";

/// Validates that `actual` matches `expected` and is non-empty.
///
/// Two empty values are treated as unset rather than equal, and fail.
/// Use [`validate_field_allow_empty`] to opt in to empty == empty.
pub fn validate_field<T>(name: &str, actual: &T, expected: &T) -> Result<()>
where
    T: PartialEq + Default + Display,
{
    validate_field_allow_empty(name, actual, expected)?;
    if *actual == T::default() {
        return Err(TokenError::EmptyField { name: name.into() });
    }
    Ok(())
}

/// Equality check only: both sides may be simultaneously empty.
pub fn validate_field_allow_empty<T>(name: &str, actual: &T, expected: &T) -> Result<()>
where
    T: PartialEq + Display,
{
    if actual != expected {
        return Err(TokenError::FieldMismatch {
            name: name.into(),
            actual: actual.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Validates that `actual` strictly equals one of `allowed`. An empty
/// candidate list always fails.
pub fn validate_field_any_of<T>(name: &str, actual: &T, allowed: &[T]) -> Result<()>
where
    T: PartialEq + Display,
{
    if allowed.iter().any(|value| actual == value) {
        return Ok(());
    }
    Err(TokenError::FieldNotAllowed {
        name: name.into(),
        actual: actual.to_string(),
        allowed: allowed
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(","),
    })
}

pub fn validate_field_starts_with(name: &str, actual: &str, prefix: &str) -> Result<()> {
    if !actual.starts_with(prefix) {
        return Err(TokenError::FieldInvalidPrefix {
            name: name.into(),
            actual: actual.into(),
            prefix: prefix.into(),
        });
    }
    Ok(())
}

pub fn validate_non_empty(name: &str, actual: &str) -> Result<()> {
    if actual.is_empty() {
        return Err(TokenError::EmptyField { name: name.into() });
    }
    Ok(())
}

/// Cross-checks every trusted-context field of the claim against the value
/// recorded in the trusted environment snapshot. The claimed event payload
/// digest is compared against a digest recomputed from the trusted payload
/// bytes, guarding against a forged payload. Fail-fast: the first mismatch
/// aborts the whole validation.
pub fn validate_github_context(github: &GithubContext, env: &TrustedEnv) -> Result<()> {
    validate_field("github.actor_id", &github.actor_id, &env.actor_id)?;
    validate_field("github.event_name", &github.event_name, &env.event_name)?;
    validate_field(
        "github.event_payload_sha256",
        &github.event_payload_sha256,
        &env.event_payload_sha256(),
    )?;
    validate_field("github.ref", &github.ref_, &env.ref_)?;
    validate_field("github.ref_type", &github.ref_type, &env.ref_type)?;
    validate_field("github.repository", &github.repository, &env.repository)?;
    validate_field(
        "github.repository_id",
        &github.repository_id,
        &env.repository_id,
    )?;
    validate_field(
        "github.repository_owner_id",
        &github.repository_owner_id,
        &env.repository_owner_id,
    )?;
    validate_field("github.run_attempt", &github.run_attempt, &env.run_attempt)?;
    validate_field("github.run_id", &github.run_id, &env.run_id)?;
    validate_field("github.run_number", &github.run_number, &env.run_number)?;
    validate_field("github.sha", &github.sha, &env.sha)?;
    validate_field(
        "github.workflow_ref",
        &github.workflow_ref,
        &env.workflow_ref,
    )?;
    validate_field_starts_with(
        "github.workflow_ref",
        &github.workflow_ref,
        &format!("{}/", env.repository),
    )?;
    validate_field(
        "github.workflow_sha",
        &github.workflow_sha,
        &env.workflow_sha,
    )?;
    Ok(())
}

/// Returns a copy of `inputs` with every name in `masked_names` replaced by
/// the [`MASKED_VALUE`] sentinel. All keys are preserved; unmasked values
/// pass through unchanged. The empty string is a no-op; any other name,
/// whitespace included, must match an input. Idempotent.
pub fn mask_inputs(
    inputs: &Map<String, Value>,
    masked_names: &[String],
) -> Result<Map<String, Value>> {
    let mut masked = inputs.clone();
    for name in masked_names {
        if name.is_empty() {
            continue;
        }
        match masked.get_mut(name) {
            Some(value) => *value = Value::String(MASKED_VALUE.into()),
            None => {
                return Err(TokenError::UnknownMaskedInput { name: name.clone() });
            }
        }
    }
    Ok(masked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn validate_field_matching_non_empty() {
        assert!(validate_field("name", &"value", &"value").is_ok());
        assert!(validate_field("version", &1u64, &1u64).is_ok());
    }

    #[test]
    fn validate_field_mismatch() {
        let err = validate_field("name", &"got", &"want").expect_err("expected an error");
        assert!(matches!(err, TokenError::FieldMismatch { .. }));
    }

    #[test]
    fn validate_field_empty_equals_empty_fails_by_default() {
        let err = validate_field("name", &"", &"").expect_err("expected an error");
        assert!(matches!(err, TokenError::EmptyField { .. }));

        // The explicit opt-in accepts two empty values.
        assert!(validate_field_allow_empty("name", &"", &"").is_ok());
    }

    #[test]
    fn validate_field_any_of_membership() {
        assert!(validate_field_any_of("label", &"ubuntu-latest", &["ubuntu-latest"]).is_ok());

        let err = validate_field_any_of("label", &"self-hosted", &["ubuntu-latest"])
            .expect_err("expected an error");
        assert!(matches!(err, TokenError::FieldNotAllowed { .. }));

        // An empty candidate list always fails.
        let err =
            validate_field_any_of::<&str>("label", &"anything", &[]).expect_err("expected an error");
        assert!(matches!(err, TokenError::FieldNotAllowed { .. }));
    }

    #[test]
    fn validate_non_empty_rejects_empty() {
        assert!(validate_non_empty("path", "./dist").is_ok());
        let err = validate_non_empty("path", "").expect_err("expected an error");
        assert!(matches!(err, TokenError::EmptyField { .. }));
    }

    #[test]
    fn validate_starts_with() {
        assert!(validate_field_starts_with(
            "github.workflow_ref",
            "acme/widget/.github/workflows/release.yml@refs/heads/main",
            "acme/widget/"
        )
        .is_ok());

        let err = validate_field_starts_with(
            "github.workflow_ref",
            "fork/widget/.github/workflows/release.yml@refs/heads/main",
            "acme/widget/",
        )
        .expect_err("expected an error");
        assert!(matches!(err, TokenError::FieldInvalidPrefix { .. }));
    }

    #[test]
    fn validate_github_context_accepts_matching_snapshot() -> anyhow::Result<()> {
        let env = TrustedEnv::for_tests();
        let github = env.as_claim_context();
        validate_github_context(&github, &env)?;
        Ok(())
    }

    #[test]
    fn validate_github_context_rejects_any_single_mismatch() {
        let env = TrustedEnv::for_tests();

        let mut github = env.as_claim_context();
        github.run_id = "1".into();
        let err = validate_github_context(&github, &env).expect_err("expected an error");
        assert!(matches!(err, TokenError::FieldMismatch { .. }));

        // Forged event payload digest.
        let mut github = env.as_claim_context();
        github.event_payload_sha256 =
            "0000000000000000000000000000000000000000000000000000000000000000".into();
        let err = validate_github_context(&github, &env).expect_err("expected an error");
        assert!(matches!(err, TokenError::FieldMismatch { .. }));
    }

    #[test]
    fn mask_inputs_replaces_only_masked_names() -> anyhow::Result<()> {
        let all = inputs(json!({"secret": "x", "public": "y", "count": 3, "flag": true}));
        let masked = mask_inputs(&all, &["secret".into()])?;

        assert_eq!(masked["secret"], json!(MASKED_VALUE));
        assert_eq!(masked["public"], json!("y"));
        // Non-string value types pass through unchanged.
        assert_eq!(masked["count"], json!(3));
        assert_eq!(masked["flag"], json!(true));
        assert_eq!(masked.len(), all.len());
        Ok(())
    }

    #[test]
    fn mask_inputs_is_idempotent() -> anyhow::Result<()> {
        let all = inputs(json!({"secret": "x", "public": "y"}));
        let names = vec!["secret".to_owned()];

        let once = mask_inputs(&all, &names)?;
        let twice = mask_inputs(&once, &names)?;
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn mask_inputs_unknown_name_fails() {
        let all = inputs(json!({"name1": "v1"}));
        let err = mask_inputs(&all, &["does-not-exist".into()]).expect_err("expected an error");
        assert!(
            matches!(err, TokenError::UnknownMaskedInput { ref name } if name == "does-not-exist")
        );
    }

    #[test]
    fn mask_inputs_ignores_empty_names() -> anyhow::Result<()> {
        let all = inputs(json!({"name1": "v1"}));
        // The workflow passes a 1-length list with an empty value when no
        // masking was requested.
        let masked = mask_inputs(&all, &["".into()])?;
        assert_eq!(masked, all);
        Ok(())
    }

    #[test]
    fn mask_inputs_whitespace_name_is_not_a_no_op() {
        // Only the empty string is exempt; a whitespace name must resolve
        // to a real input like any other.
        let all = inputs(json!({"name1": "v1"}));
        let err = mask_inputs(&all, &["  ".into()]).expect_err("expected an error");
        assert!(matches!(err, TokenError::UnknownMaskedInput { ref name } if name == "  "));
    }
}
