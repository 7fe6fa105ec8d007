/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The two remote operations the credentials provider is built on.
//!
//! [`ExchangeToken`] trades an identity token for an identity context (SSO OIDC
//! `CreateTokenWithIAM`) and [`AssumeRoleWithContext`] assumes a role with that context
//! attached (STS `AssumeRole` with `ProvidedContexts`). Both are implemented for the
//! corresponding SDK clients; tests and integrators may supply their own implementations.

use crate::error::BoxError;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Grant type used to exchange the identity token
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Context provider the identity context is bound to on `AssumeRole`
pub const IDENTITY_CENTER_CONTEXT_PROVIDER: &str =
    "arn:aws:iam::aws:contextProvider/IdentityCenter";

pub(crate) const PROVIDER_NAME: &str = "TrustedIdentityPropagation";

/// Future returned by the client traits
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Input to [`ExchangeToken::exchange_token`]
#[derive(Clone)]
pub struct TokenExchangeRequest {
    /// OAuth grant type, always [`JWT_BEARER_GRANT_TYPE`] when sent by this crate
    pub grant_type: String,
    /// The identity token being exchanged
    pub assertion: String,
    /// The application ARN registered with IAM Identity Center
    pub client_id: String,
}

impl fmt::Debug for TokenExchangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchangeRequest")
            .field("grant_type", &self.grant_type)
            .field("assertion", &"** redacted **")
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Output of [`ExchangeToken::exchange_token`]
#[derive(Clone, Default)]
pub struct TokenExchangeOutput {
    /// The ID token issued by the exchange
    pub id_token: Option<String>,
    /// Opaque assertion of the end user's identity context
    pub identity_context: Option<String>,
}

impl fmt::Debug for TokenExchangeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "** redacted **");
        f.debug_struct("TokenExchangeOutput")
            .field("id_token", &redact(&self.id_token))
            .field("identity_context", &redact(&self.identity_context))
            .finish()
    }
}

/// A context assertion paired with the provider that vouches for it
#[derive(Clone)]
pub struct ProvidedContext {
    /// ARN of the context provider
    pub provider_arn: String,
    /// The assertion passed through verbatim from the token exchange
    pub context_assertion: String,
}

impl fmt::Debug for ProvidedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvidedContext")
            .field("provider_arn", &self.provider_arn)
            .field("context_assertion", &"** redacted **")
            .finish()
    }
}

/// Input to [`AssumeRoleWithContext::assume_role`]
#[derive(Clone, Debug)]
pub struct RoleAssumptionRequest {
    /// Role to assume
    pub role_arn: String,
    /// Requested lifetime of the session
    pub duration: Duration,
    /// Role session name
    pub session_name: String,
    /// Identity context attached to the session
    pub provided_context: ProvidedContext,
    /// Credentials used to sign the `AssumeRole` call instead of the client's own
    pub credentials_override: Option<SharedCredentialsProvider>,
}

/// Exchanges an identity token for an identity context.
pub trait ExchangeToken: Send + Sync + fmt::Debug {
    /// Performs the token exchange
    fn exchange_token<'a>(
        &'a self,
        request: TokenExchangeRequest,
    ) -> BoxFuture<'a, Result<TokenExchangeOutput, BoxError>>;

    /// Credentials this client authenticates with.
    ///
    /// They also sign the identity-enhanced `AssumeRole` call.
    fn credentials_provider(&self) -> Option<SharedCredentialsProvider>;
}

/// Assumes a role with a provided identity context attached.
pub trait AssumeRoleWithContext: Send + Sync + fmt::Debug {
    /// Performs the role assumption and returns the session credentials
    fn assume_role<'a>(
        &'a self,
        request: RoleAssumptionRequest,
    ) -> BoxFuture<'a, Result<Credentials, BoxError>>;
}

impl<T> ExchangeToken for Arc<T>
where
    T: ExchangeToken + ?Sized,
{
    fn exchange_token<'a>(
        &'a self,
        request: TokenExchangeRequest,
    ) -> BoxFuture<'a, Result<TokenExchangeOutput, BoxError>> {
        T::exchange_token(self, request)
    }

    fn credentials_provider(&self) -> Option<SharedCredentialsProvider> {
        T::credentials_provider(self)
    }
}

impl<T> AssumeRoleWithContext for Arc<T>
where
    T: AssumeRoleWithContext + ?Sized,
{
    fn assume_role<'a>(
        &'a self,
        request: RoleAssumptionRequest,
    ) -> BoxFuture<'a, Result<Credentials, BoxError>> {
        T::assume_role(self, request)
    }
}

impl ExchangeToken for aws_sdk_ssooidc::Client {
    fn exchange_token<'a>(
        &'a self,
        request: TokenExchangeRequest,
    ) -> BoxFuture<'a, Result<TokenExchangeOutput, BoxError>> {
        Box::pin(async move {
            let output = self
                .create_token_with_iam()
                .client_id(request.client_id)
                .grant_type(request.grant_type)
                .assertion(request.assertion)
                .send()
                .await?;
            Ok(TokenExchangeOutput {
                id_token: output.id_token().map(str::to_string),
                identity_context: output
                    .aws_additional_details()
                    .and_then(|details| details.identity_context())
                    .map(str::to_string),
            })
        })
    }

    fn credentials_provider(&self) -> Option<SharedCredentialsProvider> {
        self.config().credentials_provider()
    }
}

impl AssumeRoleWithContext for aws_sdk_sts::Client {
    fn assume_role<'a>(
        &'a self,
        request: RoleAssumptionRequest,
    ) -> BoxFuture<'a, Result<Credentials, BoxError>> {
        Box::pin(async move {
            let context = aws_sdk_sts::types::ProvidedContext::builder()
                .provider_arn(request.provided_context.provider_arn)
                .context_assertion(request.provided_context.context_assertion)
                .build();
            let mut operation = self
                .assume_role()
                .role_arn(request.role_arn)
                .role_session_name(request.session_name)
                .duration_seconds(i32::try_from(request.duration.as_secs()).unwrap_or(i32::MAX))
                .provided_contexts(context)
                .customize();
            if let Some(credentials) = request.credentials_override {
                let config = aws_sdk_sts::Config::builder().credentials_provider(credentials);
                operation = operation.config_override(config);
            }
            let output = operation.send().await?;
            let credentials = output
                .credentials()
                .ok_or("AssumeRole response did not contain credentials")?;
            Ok(into_credentials(credentials, PROVIDER_NAME))
        })
    }
}

pub(crate) fn into_credentials(
    credentials: &aws_sdk_sts::types::Credentials,
    provider_name: &'static str,
) -> Credentials {
    Credentials::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        Some(credentials.session_token().to_string()),
        SystemTime::try_from(*credentials.expiration()).ok(),
        provider_name,
    )
}
