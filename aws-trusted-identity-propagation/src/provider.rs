/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Identity-enhanced credentials provider.
//!
//! On a cache miss the provider
//! 1. asks the [`ProvideIdentityToken`] for a fresh identity token,
//! 2. exchanges it for an identity context with [`ExchangeToken`],
//! 3. assumes the access role with the identity context attached through
//!    [`AssumeRoleWithContext`], signing that call with the token-exchange client's credentials,
//! 4. caches the resulting session credentials.

pub(crate) mod cache;

use crate::client::{
    AssumeRoleWithContext, ExchangeToken, ProvidedContext, RoleAssumptionRequest,
    TokenExchangeRequest, IDENTITY_CENTER_CONTEXT_PROVIDER, JWT_BEARER_GRANT_TYPE, PROVIDER_NAME,
};
use crate::error::{ConfigurationError, ResolveError};
use crate::session_name::identity_enhanced_session_name;
use crate::token::ProvideIdentityToken;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{future, ProvideCredentials};
use aws_credential_types::Credentials;
use aws_smithy_async::time::SharedTimeSource;
use cache::Cache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, debug_span, warn, Instrument};

/// Lifetime requested for the identity-enhanced session.
pub const SESSION_DURATION: Duration = Duration::from_secs(900);

/// Expiration assumed for credentials returned without one.
const DEFAULT_CREDENTIAL_EXPIRATION: Duration = Duration::from_secs(15 * 60);

/// When cached credentials are resolved again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum CachePolicy {
    /// Resolve once, then return the cached credentials for the lifetime of the provider.
    ///
    /// The session credentials expire after [`SESSION_DURATION`], so a long-lived provider
    /// eventually hands out expired credentials under this policy. A warning is logged the
    /// first time that happens.
    #[default]
    ReuseForever,

    /// Resolve again once the cached credentials are within `buffer` of their expiration.
    RefreshBeforeExpiry {
        /// How long before expiration the credentials are considered stale
        buffer: Duration,
    },
}

/// Credentials provider that scopes AWS credentials to the identity of an end user.
///
/// Cloning the provider shares its cache.
///
/// # Example
///
/// ```no_run
/// # async fn example(
/// #     sso_oidc: aws_sdk_ssooidc::Client,
/// #     sts: aws_sdk_sts::Client,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// use aws_trusted_identity_propagation::provider::IdentityEnhancedCredentialsProvider;
/// use aws_trusted_identity_propagation::token::identity_token_fn;
///
/// let provider = IdentityEnhancedCredentialsProvider::builder()
///     .application_arn("arn:aws:sso::123456789012:application/ssoins-1234/apl-5678")
///     .access_role_arn("arn:aws:iam::123456789012:role/access")
///     .identity_token_source(identity_token_fn(|| Ok("eyJ...".to_string())))
///     .token_exchange_client(sso_oidc)
///     .role_assumption_client(sts)
///     .build()?;
/// let credentials = provider.resolve_credentials().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct IdentityEnhancedCredentialsProvider {
    inner: Arc<Inner>,
    cache: Cache,
}

#[derive(Debug)]
struct Inner {
    token_exchange: Arc<dyn ExchangeToken>,
    role_assumption: Arc<dyn AssumeRoleWithContext>,
    token_source: Arc<dyn ProvideIdentityToken>,
    application_arn: String,
    access_role_arn: String,
    session_name: String,
    cache_policy: CachePolicy,
    time_source: SharedTimeSource,
    warned_expired: AtomicBool,
}

impl IdentityEnhancedCredentialsProvider {
    /// Returns a new [`Builder`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns the cached credentials, or runs the token exchange and role assumption if
    /// nothing usable is cached.
    ///
    /// Concurrent callers that find the cache empty share a single run. Errors are returned
    /// to every waiting caller and nothing is cached; there are no retries.
    pub async fn resolve_credentials(&self) -> Result<Credentials, ResolveError> {
        let now = self.inner.time_source.now();
        if let Some(credentials) = self.cached(now).await {
            debug!("using cached identity-enhanced credentials");
            return Ok(credentials);
        }

        let inner = self.inner.clone();
        self.cache
            .get_or_load(|| async move {
                let span = debug_span!(
                    "resolve_identity_enhanced_credentials",
                    role_arn = %inner.access_role_arn
                );
                inner.load().instrument(span).await
            })
            .await
    }

    async fn cached(&self, now: SystemTime) -> Option<Credentials> {
        let credentials = self.cache.get().await?;
        match self.inner.cache_policy {
            CachePolicy::ReuseForever => {
                if expires_within(&credentials, now, Duration::ZERO)
                    && !self.inner.warned_expired.swap(true, Ordering::Relaxed)
                {
                    warn!(
                        role_arn = %self.inner.access_role_arn,
                        "returning expired identity-enhanced credentials; \
                         use CachePolicy::RefreshBeforeExpiry to resolve them again"
                    );
                }
                Some(credentials)
            }
            CachePolicy::RefreshBeforeExpiry { buffer } => {
                if expires_within(&credentials, now, buffer) {
                    debug!("cached identity-enhanced credentials are stale");
                    self.cache
                        .clear_if(|cached| expires_within(cached, now, buffer))
                        .await;
                    None
                } else {
                    Some(credentials)
                }
            }
        }
    }
}

pub(crate) fn expires_within(
    credentials: &Credentials,
    now: SystemTime,
    buffer: Duration,
) -> bool {
    credentials
        .expiry()
        .map(|expiry| now + buffer >= expiry)
        .unwrap_or(false)
}

impl Inner {
    async fn load(&self) -> Result<Credentials, ResolveError> {
        let assertion = self
            .token_source
            .identity_token()
            .map_err(|err| ResolveError::exchange(&self.application_arn, err))?;

        debug!(application_arn = %self.application_arn, "exchanging identity token");
        let exchanged = self
            .token_exchange
            .exchange_token(TokenExchangeRequest {
                grant_type: JWT_BEARER_GRANT_TYPE.to_string(),
                assertion,
                client_id: self.application_arn.clone(),
            })
            .await
            .map_err(|err| ResolveError::exchange(&self.application_arn, err))?;

        let identity_context = match exchanged.identity_context {
            Some(context) if !context.is_empty() => context,
            Some(_) => {
                return Err(ResolveError::MalformedIdentityContext {
                    reason: "identity context is empty",
                })
            }
            None => {
                return Err(ResolveError::MalformedIdentityContext {
                    reason: "identity context is missing",
                })
            }
        };

        debug!(session_name = %self.session_name, "assuming role with identity context");
        let credentials = self
            .role_assumption
            .assume_role(RoleAssumptionRequest {
                role_arn: self.access_role_arn.clone(),
                duration: SESSION_DURATION,
                session_name: self.session_name.clone(),
                provided_context: ProvidedContext {
                    provider_arn: IDENTITY_CENTER_CONTEXT_PROVIDER.to_string(),
                    context_assertion: identity_context,
                },
                credentials_override: self.token_exchange.credentials_provider(),
            })
            .await
            .map_err(|err| ResolveError::assume_role(&self.access_role_arn, err))?;

        // Expiry drives refresh, so never cache credentials without one
        let credentials = match credentials.expiry() {
            Some(_) => credentials,
            None => Credentials::new(
                credentials.access_key_id(),
                credentials.secret_access_key(),
                credentials.session_token().map(str::to_string),
                Some(self.time_source.now() + DEFAULT_CREDENTIAL_EXPIRATION),
                PROVIDER_NAME,
            ),
        };
        debug!(expiry = ?credentials.expiry(), "resolved identity-enhanced credentials");
        Ok(credentials)
    }
}

impl ProvideCredentials for IdentityEnhancedCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(async move {
            self.resolve_credentials()
                .await
                .map_err(CredentialsError::provider_error)
        })
    }
}

/// Builder for [`IdentityEnhancedCredentialsProvider`]
#[derive(Debug, Default)]
pub struct Builder {
    application_arn: Option<String>,
    access_role_arn: Option<String>,
    token_source: Option<Arc<dyn ProvideIdentityToken>>,
    token_exchange: Option<Arc<dyn ExchangeToken>>,
    role_assumption: Option<Arc<dyn AssumeRoleWithContext>>,
    cache_policy: CachePolicy,
    time_source: Option<SharedTimeSource>,
}

impl Builder {
    /// ARN of the application registered with IAM Identity Center. Required.
    ///
    /// Used as the client id of the token exchange and to name the role session.
    pub fn application_arn(mut self, application_arn: impl Into<String>) -> Self {
        self.set_application_arn(Some(application_arn.into()));
        self
    }

    /// ARN of the application registered with IAM Identity Center. Required.
    pub fn set_application_arn(&mut self, application_arn: Option<String>) -> &mut Self {
        self.application_arn = application_arn;
        self
    }

    /// ARN of the role assumed with the identity context attached. Required.
    pub fn access_role_arn(mut self, access_role_arn: impl Into<String>) -> Self {
        self.set_access_role_arn(Some(access_role_arn.into()));
        self
    }

    /// ARN of the role assumed with the identity context attached. Required.
    pub fn set_access_role_arn(&mut self, access_role_arn: Option<String>) -> &mut Self {
        self.access_role_arn = access_role_arn;
        self
    }

    /// Source of the identity token to exchange. Required.
    pub fn identity_token_source(mut self, source: impl ProvideIdentityToken + 'static) -> Self {
        self.set_identity_token_source(Some(Arc::new(source)));
        self
    }

    /// Source of the identity token to exchange. Required.
    pub fn set_identity_token_source(
        &mut self,
        source: Option<Arc<dyn ProvideIdentityToken>>,
    ) -> &mut Self {
        self.token_source = source;
        self
    }

    /// Client performing the token exchange. Required.
    pub fn token_exchange_client(mut self, client: impl ExchangeToken + 'static) -> Self {
        self.set_token_exchange_client(Some(Arc::new(client)));
        self
    }

    /// Client performing the token exchange. Required.
    pub fn set_token_exchange_client(
        &mut self,
        client: Option<Arc<dyn ExchangeToken>>,
    ) -> &mut Self {
        self.token_exchange = client;
        self
    }

    /// Client assuming the access role. Required.
    pub fn role_assumption_client(mut self, client: impl AssumeRoleWithContext + 'static) -> Self {
        self.set_role_assumption_client(Some(Arc::new(client)));
        self
    }

    /// Client assuming the access role. Required.
    pub fn set_role_assumption_client(
        &mut self,
        client: Option<Arc<dyn AssumeRoleWithContext>>,
    ) -> &mut Self {
        self.role_assumption = client;
        self
    }

    /// When to resolve cached credentials again. Defaults to [`CachePolicy::ReuseForever`].
    pub fn cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    /// Time source used to check expiration. Defaults to the system clock.
    pub fn time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Creates the [`IdentityEnhancedCredentialsProvider`].
    ///
    /// Fails with [`ConfigurationError::MissingField`] if a required option was not set, or
    /// was set to an empty string.
    pub fn build(self) -> Result<IdentityEnhancedCredentialsProvider, ConfigurationError> {
        let application_arn = self
            .application_arn
            .filter(|arn| !arn.is_empty())
            .ok_or(ConfigurationError::MissingField("application_arn"))?;
        let access_role_arn = self
            .access_role_arn
            .filter(|arn| !arn.is_empty())
            .ok_or(ConfigurationError::MissingField("access_role_arn"))?;
        let token_source = self
            .token_source
            .ok_or(ConfigurationError::MissingField("identity_token_source"))?;
        let token_exchange = self
            .token_exchange
            .ok_or(ConfigurationError::MissingField("token_exchange_client"))?;
        let role_assumption = self
            .role_assumption
            .ok_or(ConfigurationError::MissingField("role_assumption_client"))?;
        let session_name = identity_enhanced_session_name(&application_arn)?;

        Ok(IdentityEnhancedCredentialsProvider {
            inner: Arc::new(Inner {
                token_exchange,
                role_assumption,
                token_source,
                application_arn,
                access_role_arn,
                session_name,
                cache_policy: self.cache_policy,
                time_source: self.time_source.unwrap_or_default(),
                warned_expired: AtomicBool::new(false),
            }),
            cache: Cache::new(),
        })
    }
}
