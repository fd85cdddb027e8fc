//! AWS Signature Version 4 for HTTP requests, computed by `aws-sigv4`.
//!
//! This module adapts the crate's types to the SDK signer: credential
//! snapshots become an SDK identity, the clock's instant becomes the signing
//! time, and the resulting signing instructions are applied to the request
//! in place.

use std::time::SystemTime;

use aws_sigv4::http_request::{
    SignableBody, SignableRequest, SigningParams as SdkSigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use awsauth_credential::Credentials;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::Request;
use http::header::{AUTHORIZATION, HeaderName};

use crate::error::{Result, SigningError};

pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

/// Target and time of one signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

/// Result of signing, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningOutput {
    pub signature: String,
    /// `;`-joined header names covered by the signature.
    pub signed_headers: String,
}

fn signer_error(err: impl std::fmt::Display) -> SigningError {
    SigningError::InvalidRequest(err.to_string())
}

fn to_sdk(credentials: &Credentials) -> aws_credential_types::Credentials {
    aws_credential_types::Credentials::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        credentials.session_token().map(str::to_owned),
        credentials.expires_at().map(SystemTime::from),
        credentials.provider_name(),
    )
}

/// Signs `request` in place.
///
/// Sets `X-Amz-Date`, `X-Amz-Security-Token` when the credentials carry a
/// session token, and `Authorization`. Previous values of those headers are
/// dropped before signing. Every other header present is signed, except the
/// ones the SDK signer leaves out because intermediaries rewrite them
/// (`user-agent`, `x-amzn-trace-id`, `transfer-encoding`).
pub fn sign(
    request: &mut Request<Bytes>,
    credentials: &Credentials,
    params: &SigningParams<'_>,
) -> Result<SigningOutput> {
    if request.uri().authority().is_none() {
        return Err(SigningError::InvalidRequest("request URI has no host".into()));
    }

    let headers = request.headers_mut();
    headers.remove(AUTHORIZATION);
    headers.remove(HeaderName::from_static(X_AMZ_DATE));
    headers.remove(HeaderName::from_static(X_AMZ_SECURITY_TOKEN));

    let identity = to_sdk(credentials).into();
    let sdk_params: SdkSigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(params.region)
        .name(params.service)
        .time(SystemTime::from(params.time))
        .settings(SigningSettings::default())
        .build()
        .map_err(signer_error)?
        .into();

    let uri = request.uri().to_string();
    let header_pairs = request
        .headers()
        .iter()
        .map(|(name, value)| {
            value
                .to_str()
                .map(|value| (name.as_str(), value))
                .map_err(|_| {
                    SigningError::InvalidRequest(format!("header {name} is not visible ASCII"))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    let signable = SignableRequest::new(
        request.method().as_str(),
        uri.as_str(),
        header_pairs.into_iter(),
        SignableBody::Bytes(request.body()),
    )
    .map_err(signer_error)?;

    let (instructions, signature) = aws_sigv4::http_request::sign(signable, &sdk_params)
        .map_err(signer_error)?
        .into_parts();
    instructions.apply_to_request_http1x(request);

    if let Some(value) = request.headers_mut().get_mut(AUTHORIZATION) {
        value.set_sensitive(true);
    }
    if let Some(value) = request.headers_mut().get_mut(X_AMZ_SECURITY_TOKEN) {
        value.set_sensitive(true);
    }
    let signed_headers = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(signed_headers_of)
        .unwrap_or_default();

    Ok(SigningOutput {
        signature,
        signed_headers,
    })
}

/// Extracts the `SignedHeaders=` component of an `Authorization` value.
fn signed_headers_of(authorization: &str) -> Option<String> {
    authorization
        .split(", ")
        .find_map(|part| part.strip_prefix("SignedHeaders="))
        .map(str::to_owned)
}
