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

//! The errors that can be raised by slsa-delegator.
//!
//! Every stage of the trust pipeline fails fast: no retry, no partial
//! acceptance. Errors propagate unrecovered to the caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TokenError>;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("malformed token: expected 2 segments, got {parts}")]
    MalformedToken { parts: usize },

    #[error("malformed claim payload: {0}")]
    MalformedClaim(String),

    #[error("bundle does not contain a certificate chain")]
    MissingCertificate,

    #[error("cannot find URI in certificate Subject Alternative Name")]
    MissingSan,

    #[error("invalid certificate identity URI: {uri}")]
    InvalidUriFormat { uri: String },

    #[error("cannot find extension '{oid}' in certificate")]
    MissingExtension { oid: String },

    #[error("cannot derive tool path from '{uri}'")]
    PathDerivation { uri: String },

    #[error("mismatch {name}: got '{actual}', expected '{expected}'")]
    FieldMismatch {
        name: String,
        actual: String,
        expected: String,
    },

    #[error("mismatch {name}: got '{actual}', expected one of '{allowed}'")]
    FieldNotAllowed {
        name: String,
        actual: String,
        allowed: String,
    },

    #[error("invalid {name}: expected '{actual}' to start with '{prefix}'")]
    FieldInvalidPrefix {
        name: String,
        actual: String,
        prefix: String,
    },

    #[error("empty {name}, expected non-empty value")]
    EmptyField { name: String },

    #[error("masked input '{name}' does not exist in the input map")]
    UnknownMaskedInput { name: String },

    #[error("invalid audience from OIDC token")]
    AudienceMismatch,

    #[error("job_workflow_ref missing from OIDC token")]
    MissingWorkflowRef,

    #[error("referenced reusable workflows disagree on repository or ref")]
    AmbiguousWorkflowReference,

    #[error("no trusted reusable workflow referenced by the triggering run")]
    NoReusableWorkflow,

    #[error("self-hosted runners are not allowed: jobs: {jobs}")]
    SelfHostedRunner { jobs: String },

    #[error("unsafe path {path}")]
    UnsafePath { path: String },

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("invalid sha1: {0}")]
    InvalidSha1(String),

    #[error("GitHub API request unsuccessful: {0}")]
    GithubApiError(String),

    #[error(transparent)]
    Base64DecodeError(#[from] base64::DecodeError),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    #[error(transparent)]
    X509ParseError(#[from] x509_cert::der::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    Utf8Error(#[from] std::str::Utf8Error),
}
