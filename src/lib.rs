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

//! Verification of SLSA delegator provenance tokens.
//!
//! A delegator workflow hands a signed, two-segment token to a trusted
//! builder: a Sigstore bundle and a base64 claim payload. This crate makes
//! the trust decision for that token and turns an accepted claim into a
//! SLSA provenance predicate (v0.2 or v1.0-rc1).
//!
//! The pipeline is fail-fast and side-effect free until the very end:
//!
//! 1. decode the token ([`token`]) and verify the bundle signature over
//!    the payload text ([`verify::SignatureVerifier`]);
//! 2. validate every claim field against an immutable snapshot of the
//!    trusted environment ([`validate`], [`environment`]);
//! 3. mask sensitive workflow inputs before they can reach any output;
//! 4. extract the signer identity from the Fulcio certificate ([`cert`]);
//! 5. build the predicate ([`predicate`]) and write it exactly once
//!    through the sandboxed filesystem boundary ([`workspace`]).
//!
//! ```rust,no_run
//! use slsa_delegator::environment::TrustedEnv;
//! use slsa_delegator::github::GithubApiClient;
//! use slsa_delegator::token::SlsaVersion;
//! use slsa_delegator::verify::{generate_predicate, write_predicate, TokenVerifier};
//! use slsa_delegator::workspace::Workspace;
//!
//! # async fn example(signature_verifier: Box<dyn slsa_delegator::verify::SignatureVerifier>) -> slsa_delegator::errors::Result<()> {
//! let workspace = Workspace::from_env();
//! let env = TrustedEnv::from_env(&workspace)?;
//! let client = GithubApiClient::new("github-token");
//!
//! let verifier = TokenVerifier::new(signature_verifier);
//! let verified = verifier
//!     .verify_token("base64bundle.base64claim", "delegator_generic_slsa3.yml", &env)
//!     .await?;
//!
//! let predicate = generate_predicate(&verified, SlsaVersion::V1Rc1, &client, &env).await?;
//! write_predicate(&workspace, "predicate.json".as_ref(), &predicate)?;
//! # Ok(())
//! # }
//! ```
//!
//! Workflow-identity resolution for the delegator itself (which reusable
//! workflow is executing, and on which runners) lives in [`detect`].

pub mod cert;
pub mod detect;
pub mod environment;
pub mod errors;
pub mod github;
pub mod predicate;
pub mod token;
pub mod validate;
pub mod verify;
pub mod workspace;

pub use errors::{Result, TokenError};
pub use token::{RawToken, SignedToken, SlsaVersion};
pub use verify::{SignatureVerifier, TokenVerifier, VerifiedToken};
