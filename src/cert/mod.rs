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

//! Signer identity extraction from the bundle's leaf certificate.
//!
//! Fulcio certificates carry the identity of the reusable workflow that
//! produced the signature: the workflow URI in the Subject Alternative Name
//! and the workflow's commit SHA in a custom extension.
//!
//! <https://github.com/sigstore/fulcio/blob/main/docs/oid-info.md>

use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use const_oid::ObjectIdentifier;
use tracing::debug;
use x509_cert::{
    der::Decode,
    ext::pkix::{name::GeneralName, SubjectAltName},
    Certificate,
};

use crate::errors::{Result, TokenError};
use crate::token::SigningBundle;

/// Fulcio's "Build Signer Digest" extension: the commit SHA of the workflow
/// that requested the signing certificate.
pub const BUILD_SIGNER_DIGEST_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.10");

const GITHUB_URL: &str = "https://github.com/";

const SHA1_BYTE_LEN: usize = 20;

/// The identity recovered from the signing certificate: which reusable
/// workflow, at which commit, produced the signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateIdentity {
    /// Full SAN URI, e.g.
    /// `https://github.com/acme/tool/.github/workflows/build.yml@refs/heads/main`.
    pub uri: String,
    /// `owner/repo` of the signing workflow.
    pub repository: String,
    /// Git ref of the signing workflow.
    pub ref_: String,
    /// Commit SHA of the signing workflow, from the Fulcio extension.
    pub commit_sha: String,
    /// Workflow path inside the repository, without repository or ref.
    pub tool_path: String,
}

impl CertificateIdentity {
    /// Extracts the signer identity from the first (leaf) certificate of
    /// the bundle's chain.
    pub fn extract(bundle: &SigningBundle) -> Result<CertificateIdentity> {
        let chain = bundle
            .verification_material
            .as_ref()
            .and_then(|m| m.x509_certificate_chain.as_ref())
            .ok_or(TokenError::MissingCertificate)?;

        // The first certificate is the client certificate.
        let leaf = chain
            .certificates
            .first()
            .ok_or(TokenError::MissingCertificate)?;
        let der = base64.decode(&leaf.raw_bytes)?;
        let certificate = Certificate::from_der(&der)?;

        let uri = san_uri(&certificate)?;
        debug!(uri, "tool-uri");

        let (repository, ref_) = split_identity_uri(&uri)?;
        debug!(repository, ref_, "tool identity");

        let commit_sha = extension_digest(&certificate, BUILD_SIGNER_DIGEST_OID, SHA1_BYTE_LEN)?;
        let tool_path = derive_tool_path(&uri, &repository, &ref_)?;

        Ok(CertificateIdentity {
            uri,
            repository,
            ref_,
            commit_sha,
            tool_path,
        })
    }
}

/// Returns the first URI-typed entry of the certificate's SAN.
fn san_uri(certificate: &Certificate) -> Result<String> {
    let (_, san): (bool, SubjectAltName) = certificate
        .tbs_certificate
        .get()
        .map_err(|_| TokenError::MissingSan)?
        .ok_or(TokenError::MissingSan)?;

    san.0
        .iter()
        .find_map(|name| match name {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.as_str().to_owned()),
            _ => None,
        })
        .ok_or(TokenError::MissingSan)
}

/// Splits a SAN URI of the form
/// `https://github.com/<owner>/<repo>/<path...>@<ref>` into the repository
/// and the ref. Refs may themselves contain `@`, so the split is on the
/// last occurrence.
pub(crate) fn split_identity_uri(uri: &str) -> Result<(String, String)> {
    let invalid = || TokenError::InvalidUriFormat { uri: uri.into() };

    let (url, ref_) = uri.rsplit_once('@').ok_or_else(invalid)?;
    let path = url.strip_prefix(GITHUB_URL).ok_or_else(invalid)?;

    let mut segments = path.split('/');
    let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    // A bare owner/repo with no workflow path is not a workflow identity.
    segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

    Ok((format!("{owner}/{repo}"), ref_.to_owned()))
}

/// Recovers a hex digest from a custom certificate extension.
///
/// The extension value wraps the hex text in DER; rather than assume an
/// exact inner encoding, take the trailing run of hex characters and keep
/// the last `hash_len * 2` of them.
pub(crate) fn extension_digest(
    certificate: &Certificate,
    oid: ObjectIdentifier,
    hash_len: usize,
) -> Result<String> {
    let extensions = certificate
        .tbs_certificate
        .extensions
        .as_deref()
        .unwrap_or(&[]);
    let extension = extensions
        .iter()
        .find(|ext| ext.extn_id == oid)
        .ok_or_else(|| TokenError::MissingExtension {
            oid: oid.to_string(),
        })?;

    let text = String::from_utf8_lossy(extension.extn_value.as_bytes()).into_owned();
    trailing_hex(&text, hash_len * 2).ok_or_else(|| TokenError::MissingExtension {
        oid: oid.to_string(),
    })
}

/// Returns the last `want` characters of the trailing hex run of `text`,
/// lowercased, or `None` if the run is shorter than `want`.
fn trailing_hex(text: &str, want: usize) -> Option<String> {
    let trimmed = text.trim_end();
    let run_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_hexdigit())
        .last()
        .map(|(i, _)| i)?;
    let run = &trimmed[run_start..];
    if run.len() < want {
        return None;
    }
    Some(run[run.len() - want..].to_ascii_lowercase())
}

/// Strips the repository prefix and ref suffix from the SAN URI, leaving
/// the workflow path.
pub(crate) fn derive_tool_path(uri: &str, repository: &str, ref_: &str) -> Result<String> {
    let err = || TokenError::PathDerivation { uri: uri.into() };

    let without_prefix = uri
        .strip_prefix(&format!("{GITHUB_URL}{repository}/"))
        .ok_or_else(err)?;
    let path = without_prefix
        .strip_suffix(&format!("@{ref_}"))
        .ok_or_else(err)?;
    Ok(path.to_owned())
}
