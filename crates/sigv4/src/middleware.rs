//! HTTP transport decorator that signs every request.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use awsauth_credential::error::BoxError;
use awsauth_credential::{AuthSettings, CredentialsConfig, SessionCache};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, Request, Response};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_SIGNED_HEADERS, SigV4Config, header_names};
use crate::error::{Result, SigningError};
use crate::signer::{SigningParams, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN, sign};

/// Sends HTTP requests. The seam the signing middleware wraps.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
        (**self).send(request).await
    }
}

#[derive(Debug)]
struct Target {
    credentials: CredentialsConfig,
    region: String,
    service: String,
}

/// Signs requests with credentials from a shared [`SessionCache`] and
/// forwards them to the inner transport.
///
/// Only a fixed set of headers is signed. Every other header is removed
/// before signing and put back afterwards, unless signing set a header of
/// the same name. Configuration problems do not fail construction: the
/// transport is still built and every request fails with
/// [`SigningError::InvalidConfig`].
pub struct SigningTransport<T> {
    inner: T,
    cache: Arc<SessionCache>,
    policy: AuthSettings,
    target: Result<Target, String>,
    signed_headers: Vec<HeaderName>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    verbose: bool,
}

impl<T: HttpTransport> SigningTransport<T> {
    pub fn new(inner: T, config: &SigV4Config, policy: AuthSettings, cache: Arc<SessionCache>) -> Self {
        let target = config
            .credentials_config()
            .map(|credentials| Target {
                credentials,
                region: config.region.clone(),
                service: config.service.clone(),
            })
            .map_err(|err| match err {
                SigningError::InvalidConfig(reason) => reason,
                other => other.to_string(),
            });
        if let Err(reason) = &target {
            tracing::error!(reason = %reason, "invalid SigV4 configuration");
        }

        Self {
            inner,
            cache,
            policy,
            target,
            signed_headers: DEFAULT_SIGNED_HEADERS
                .iter()
                .map(|name| HeaderName::from_static(name))
                .collect(),
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            verbose: false,
        }
    }

    /// Adds headers to the signed set.
    pub fn with_signed_headers<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        match header_names(names) {
            Ok(names) => {
                for name in names {
                    if !self.signed_headers.contains(&name) {
                        self.signed_headers.push(name);
                    }
                }
            }
            Err(err) => {
                if self.target.is_ok() {
                    self.target = Err(match err {
                        SigningError::InvalidConfig(reason) => reason,
                        other => other.to_string(),
                    });
                }
            }
        }
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Token observed by requests sent through [`HttpTransport::send`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Logs every request before and after signing.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Signs and sends `request`, racing credential resolution against
    /// `cancel`.
    pub async fn send_with_cancel(
        &self,
        request: Request<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<Response<Bytes>> {
        let target = self
            .target
            .as_ref()
            .map_err(|reason| SigningError::InvalidConfig(reason.clone()))?;

        let resolved = self.cache.get(&target.credentials, &self.policy, cancel).await?;
        let credentials = resolved.credentials().await?;

        self.log_request(&request, "pre-signature");
        let (mut parts, body) = request.into_parts();
        for name in [AUTHORIZATION.as_str(), X_AMZ_DATE, X_AMZ_SECURITY_TOKEN] {
            parts.headers.remove(name);
        }
        let held = hold_back(&mut parts.headers, &self.signed_headers);
        let mut request = Request::from_parts(parts, body);

        let params = SigningParams {
            region: &target.region,
            service: &target.service,
            time: self.clock.now(),
        };
        let output = sign(&mut request, &credentials, &params)?;
        restore(request.headers_mut(), held);

        if self.verbose {
            tracing::debug!(
                stage = "post-signature",
                signed_headers = %output.signed_headers,
                signature = %output.signature,
                "signed request"
            );
        }

        self.inner
            .send(request)
            .await
            .map_err(SigningError::Transport)
    }

    fn log_request(&self, request: &Request<Bytes>, stage: &'static str) {
        if !self.verbose {
            return;
        }
        let headers: Vec<&str> = request.headers().keys().map(HeaderName::as_str).collect();
        tracing::debug!(
            stage,
            method = %request.method(),
            uri = %request.uri(),
            headers = ?headers,
            body_len = request.body().len(),
            "request dump"
        );
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for SigningTransport<T> {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
        Ok(self.send_with_cancel(request, &self.cancel).await?)
    }
}

impl<T> fmt::Debug for SigningTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningTransport")
            .field("target", &self.target.as_ref().map(|t| (&t.region, &t.service)))
            .field("signed_headers", &self.signed_headers)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Moves every header outside `signed` into a separate map.
fn hold_back(headers: &mut HeaderMap, signed: &[HeaderName]) -> HeaderMap {
    let names: Vec<HeaderName> = headers
        .keys()
        .filter(|name| !signed.contains(name))
        .cloned()
        .collect();
    let mut held = HeaderMap::new();
    for name in names {
        for value in headers.get_all(&name) {
            held.append(name.clone(), value.clone());
        }
        headers.remove(&name);
    }
    held
}

/// Puts held headers back without overwriting anything signing set.
fn restore(headers: &mut HeaderMap, held: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in held {
        if let Some(name) = name {
            current = (!headers.contains_key(&name)).then_some(name);
        }
        if let Some(name) = &current {
            headers.append(name.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn hold_back_keeps_only_signed_headers() {
        let mut headers = map(&[
            ("content-type", "application/json"),
            ("x-scope-orgid", "tenant-1"),
            ("x-scope-orgid", "tenant-2"),
        ]);
        let signed = [HeaderName::from_static("content-type")];

        let held = hold_back(&mut headers, &signed);

        assert_eq!(headers.len(), 1);
        assert_eq!(held.get_all("x-scope-orgid").iter().count(), 2);
    }

    #[test]
    fn restore_never_overwrites() {
        let mut headers = map(&[("authorization", "AWS4-HMAC-SHA256 ...")]);
        let held = map(&[
            ("authorization", "Bearer caller"),
            ("x-custom", "a"),
            ("x-custom", "b"),
        ]);

        restore(&mut headers, held);

        assert_eq!(headers["authorization"], "AWS4-HMAC-SHA256 ...");
        let custom: Vec<_> = headers.get_all("x-custom").iter().collect();
        assert_eq!(custom, ["a", "b"]);
    }
}
