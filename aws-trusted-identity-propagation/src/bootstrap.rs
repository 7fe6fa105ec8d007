/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Credentials for an SSO OIDC client created without any ambient credentials.
//!
//! The application role is assumed with `AssumeRoleWithWebIdentity`, using the caller's identity
//! token as the web identity. That call is unsigned, so the STS client needs no credentials.

use crate::client::into_credentials;
use crate::provider::cache::Cache;
use crate::provider::expires_within;
use crate::token::ProvideIdentityToken;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{future, ProvideCredentials};
use aws_credential_types::Credentials;
use aws_smithy_async::time::SharedTimeSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, debug_span, Instrument};

const PROVIDER_NAME: &str = "TrustedIdentityPropagationBootstrap";

/// Bootstrap credentials are loaded again this long before they expire
const REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Bootstrap session of the application role, cached until close to expiry.
#[derive(Clone, Debug)]
pub(crate) struct WebIdentityBootstrap {
    inner: Arc<Inner>,
    cache: Cache,
}

#[derive(Debug)]
struct Inner {
    sts: aws_sdk_sts::Client,
    role_arn: String,
    session_name: String,
    token_source: Arc<dyn ProvideIdentityToken>,
    time_source: SharedTimeSource,
}

impl WebIdentityBootstrap {
    pub(crate) fn new(
        sts: aws_sdk_sts::Client,
        role_arn: String,
        session_name: String,
        token_source: Arc<dyn ProvideIdentityToken>,
        time_source: SharedTimeSource,
    ) -> Self {
        WebIdentityBootstrap {
            inner: Arc::new(Inner {
                sts,
                role_arn,
                session_name,
                token_source,
                time_source,
            }),
            cache: Cache::new(),
        }
    }

    async fn credentials(&self) -> Result<Credentials, CredentialsError> {
        let now = self.inner.time_source.now();
        let stale = |credentials: &Credentials| expires_within(credentials, now, REFRESH_BUFFER);
        if let Some(credentials) = self.cache.get().await {
            if !stale(&credentials) {
                return Ok(credentials);
            }
            self.cache.clear_if(stale).await;
        }

        let inner = self.inner.clone();
        self.cache
            .get_or_load(|| async move {
                let span = debug_span!("bootstrap_credentials", role_arn = %inner.role_arn);
                inner.load().instrument(span).await
            })
            .await
    }
}

impl Inner {
    async fn load(&self) -> Result<Credentials, CredentialsError> {
        // read fresh every time; the caller's token may have been rotated
        let token = self
            .token_source
            .identity_token()
            .map_err(CredentialsError::provider_error)?;

        debug!(session_name = %self.session_name, "assuming application role with web identity");
        let output = self
            .sts
            .assume_role_with_web_identity()
            .role_arn(&self.role_arn)
            .role_session_name(&self.session_name)
            .web_identity_token(token)
            .send()
            .await
            .map_err(CredentialsError::provider_error)?;
        let credentials = output.credentials().ok_or_else(|| {
            CredentialsError::provider_error(
                "AssumeRoleWithWebIdentity response did not contain credentials",
            )
        })?;
        Ok(into_credentials(credentials, PROVIDER_NAME))
    }
}

impl ProvideCredentials for WebIdentityBootstrap {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.credentials())
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub(crate) const WEB_IDENTITY_RESPONSE: &str = r#"<AssumeRoleWithWebIdentityResponse
    xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <Credentials>
      <AccessKeyId>ASIABOOTSTRAP</AccessKeyId>
      <SecretAccessKey>bootstrap-secret</SecretAccessKey>
      <SessionToken>bootstrap-session-token</SessionToken>
      <Expiration>2030-01-01T00:00:00Z</Expiration>
    </Credentials>
    <SubjectFromWebIdentityToken>user</SubjectFromWebIdentityToken>
  </AssumeRoleWithWebIdentityResult>
  <ResponseMetadata>
    <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
  </ResponseMetadata>
</AssumeRoleWithWebIdentityResponse>"#;

    /// Requests received by [`start_sts_server`], raw head and body
    pub(crate) type Captured = Arc<Mutex<Vec<String>>>;

    /// Serves `response` as XML to every request on a local port. Returns the endpoint URL.
    pub(crate) async fn start_sts_server(response: &'static str) -> (String, Captured) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("socket is free");
        let bind_addr = listener.local_addr().unwrap();
        let captured = Captured::default();
        let requests = captured.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener
                    .accept()
                    .await
                    .expect("listener can accept new connections");
                let request = read_request(&mut socket).await;
                requests.lock().unwrap().push(request);
                let reply = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/xml\r\ncontent-length: {}\r\n\
                     connection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{bind_addr}"), captured)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Decodes the percent-encoding of a form body
    pub(crate) fn percent_decode(input: &str) -> String {
        let bytes = input.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'%' if i + 2 < bytes.len() => {
                    let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                    out.push(u8::from_str_radix(hex, 16).unwrap());
                    i += 3;
                }
                b => {
                    out.push(b);
                    i += 1;
                }
            }
        }
        String::from_utf8(out).unwrap()
    }
}
