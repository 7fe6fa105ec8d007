/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Attaching identity-enhanced credentials to SDK clients.
//!
//! [`TrustedIdentityPropagation`] builds an [`IdentityEnhancedCredentialsProvider`], creating
//! any client that was not supplied. None of the created clients use ambient credentials:
//! - the SSO OIDC client authenticates as a bootstrap session of the application role, assumed
//!   with `AssumeRoleWithWebIdentity` using the caller's identity token,
//! - the STS clients carry no credentials of their own; every identity-enhanced `AssumeRole`
//!   call is signed with the SSO OIDC client's credentials.

use crate::bootstrap::WebIdentityBootstrap;
use crate::client::{AssumeRoleWithContext, ExchangeToken};
use crate::error::ConfigurationError;
use crate::provider::{CachePolicy, IdentityEnhancedCredentialsProvider};
use crate::session_name::bootstrap_session_name;
use crate::token::ProvideIdentityToken;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_smithy_async::time::SharedTimeSource;
use aws_types::SdkConfig;
use std::sync::Arc;
use tracing::debug;

/// Identity-enhanced credentials ready to be installed into SDK clients.
///
/// Clients created by [`Builder::build`] are owned by this value. Dropping it, or calling
/// [`close`](TrustedIdentityPropagation::close), releases them once nothing else refers to
/// them: credentials providers handed out by
/// [`credentials_provider`](TrustedIdentityPropagation::credentials_provider) or
/// [`configure`](TrustedIdentityPropagation::configure), and copies made through
/// [`to_builder`](TrustedIdentityPropagation::to_builder), keep sharing those clients until they
/// are dropped themselves.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use aws_trusted_identity_propagation::token::identity_token_fn;
/// use aws_trusted_identity_propagation::TrustedIdentityPropagation;
///
/// let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
/// let tip = TrustedIdentityPropagation::builder()
///     .application_arn("arn:aws:sso::123456789012:application/ssoins-1234/apl-5678")
///     .access_role_arn("arn:aws:iam::123456789012:role/access")
///     .identity_token_source(identity_token_fn(|| Ok("eyJ...".to_string())))
///     .sdk_config(sdk_config.clone())
///     .build()
///     .await?;
///
/// let sts = aws_sdk_sts::Client::new(&tip.configure(&sdk_config));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TrustedIdentityPropagation {
    provider: IdentityEnhancedCredentialsProvider,
    settings: Builder,
    owned: Vec<OwnedResource>,
}

#[derive(Debug)]
enum OwnedResource {
    BootstrapStsClient(aws_sdk_sts::Client),
    BootstrapCredentials(SharedCredentialsProvider),
    TokenExchangeClient(aws_sdk_ssooidc::Client),
    RoleAssumptionClient(aws_sdk_sts::Client),
}

impl OwnedResource {
    fn name(&self) -> &'static str {
        match self {
            OwnedResource::BootstrapStsClient(_) => "bootstrap_sts_client",
            OwnedResource::BootstrapCredentials(_) => "bootstrap_credentials_provider",
            OwnedResource::TokenExchangeClient(_) => "sso_oidc_client",
            OwnedResource::RoleAssumptionClient(_) => "sts_client",
        }
    }
}

impl TrustedIdentityPropagation {
    /// Returns a new [`Builder`]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns a [`Builder`] holding this value's settings and the clients it uses.
    ///
    /// Clients created by [`Builder::build`] are shared with whatever the returned builder
    /// builds; the copy does not own them.
    pub fn to_builder(&self) -> Builder {
        self.settings.clone()
    }

    /// The identity-enhanced credentials provider
    pub fn provider(&self) -> &IdentityEnhancedCredentialsProvider {
        &self.provider
    }

    /// The identity-enhanced credentials provider, ready to be set on a client config
    pub fn credentials_provider(&self) -> SharedCredentialsProvider {
        SharedCredentialsProvider::new(self.provider.clone())
    }

    /// Returns a copy of `config` that resolves identity-enhanced credentials.
    pub fn configure(&self, config: &SdkConfig) -> SdkConfig {
        config
            .to_builder()
            .credentials_provider(self.credentials_provider())
            .build()
    }

    /// Drops the provider, then the clients created by [`Builder::build`] in creation order.
    pub fn close(self) {
        let TrustedIdentityPropagation {
            provider,
            settings,
            owned,
        } = self;
        drop(provider);
        drop(settings);
        for resource in owned {
            let name = resource.name();
            drop(resource);
            debug!(resource = name, "released");
        }
    }
}

/// Builder for [`TrustedIdentityPropagation`]
#[derive(Clone, Debug, Default)]
pub struct Builder {
    application_arn: Option<String>,
    access_role_arn: Option<String>,
    application_role_arn: Option<String>,
    token_source: Option<Arc<dyn ProvideIdentityToken>>,
    token_exchange: Option<Arc<dyn ExchangeToken>>,
    role_assumption: Option<Arc<dyn AssumeRoleWithContext>>,
    sdk_config: Option<SdkConfig>,
    cache_policy: CachePolicy,
    time_source: Option<SharedTimeSource>,
}

impl Builder {
    /// ARN of the application registered with IAM Identity Center. Required.
    pub fn application_arn(mut self, application_arn: impl Into<String>) -> Self {
        self.application_arn = Some(application_arn.into());
        self
    }

    /// ARN of the role assumed with the identity context attached. Required.
    pub fn access_role_arn(mut self, access_role_arn: impl Into<String>) -> Self {
        self.access_role_arn = Some(access_role_arn.into());
        self
    }

    /// Role assumed with the caller's identity token by the bootstrap session that calls
    /// SSO OIDC.
    ///
    /// Only used when no token-exchange client is supplied. Defaults to the access role.
    pub fn application_role_arn(mut self, application_role_arn: impl Into<String>) -> Self {
        self.application_role_arn = Some(application_role_arn.into());
        self
    }

    /// Source of the identity token to exchange. Required.
    pub fn identity_token_source(mut self, source: impl ProvideIdentityToken + 'static) -> Self {
        self.token_source = Some(Arc::new(source));
        self
    }

    /// Client performing the token exchange, usually an [`aws_sdk_ssooidc::Client`].
    pub fn token_exchange_client(mut self, client: impl ExchangeToken + 'static) -> Self {
        self.token_exchange = Some(Arc::new(client));
        self
    }

    /// Client assuming the access role, usually an [`aws_sdk_sts::Client`].
    pub fn role_assumption_client(mut self, client: impl AssumeRoleWithContext + 'static) -> Self {
        self.role_assumption = Some(Arc::new(client));
        self
    }

    /// Configuration for the clients created by [`build`](Builder::build).
    ///
    /// Only region, endpoint, HTTP and retry settings are taken from it; created clients never
    /// use its credentials. When unset and a client has to be created, the configuration is
    /// loaded from the default provider chain.
    pub fn sdk_config(mut self, sdk_config: SdkConfig) -> Self {
        self.sdk_config = Some(sdk_config);
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

    /// Validates the options, then creates any client that was not supplied.
    pub async fn build(self) -> Result<TrustedIdentityPropagation, ConfigurationError> {
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

        let mut sdk_config = self.sdk_config;
        let mut owned = Vec::new();

        let token_exchange = match self.token_exchange {
            Some(client) => client,
            None => {
                let role_arn = self
                    .application_role_arn
                    .clone()
                    .filter(|arn| !arn.is_empty())
                    .unwrap_or_else(|| access_role_arn.clone());
                let session_name = bootstrap_session_name(&application_arn)?;
                debug!(
                    role_arn = %role_arn,
                    session_name = %session_name,
                    "creating SSO OIDC client"
                );

                let conf = load_sdk_config(&mut sdk_config).await;
                let sts = aws_sdk_sts::Client::from_conf(anonymous_sts_config(conf));
                let time_source = self
                    .time_source
                    .clone()
                    .or_else(|| conf.time_source())
                    .unwrap_or_default();
                let bootstrap = SharedCredentialsProvider::new(WebIdentityBootstrap::new(
                    sts.clone(),
                    role_arn,
                    session_name,
                    token_source.clone(),
                    time_source,
                ));
                let mut config = aws_sdk_ssooidc::config::Builder::from(conf);
                config.set_credentials_provider(Some(bootstrap.clone()));
                if conf.behavior_version().is_none() {
                    config.set_behavior_version(Some(BehaviorVersion::latest()));
                }
                let client = aws_sdk_ssooidc::Client::from_conf(config.build());
                owned.push(OwnedResource::BootstrapStsClient(sts));
                owned.push(OwnedResource::BootstrapCredentials(bootstrap));
                owned.push(OwnedResource::TokenExchangeClient(client.clone()));
                Arc::new(client) as Arc<dyn ExchangeToken>
            }
        };

        let role_assumption = match self.role_assumption {
            Some(client) => client,
            None => {
                debug!("creating STS client");
                let conf = load_sdk_config(&mut sdk_config).await;
                let client = aws_sdk_sts::Client::from_conf(anonymous_sts_config(conf));
                owned.push(OwnedResource::RoleAssumptionClient(client.clone()));
                Arc::new(client) as Arc<dyn AssumeRoleWithContext>
            }
        };

        let settings = Builder {
            application_arn: Some(application_arn.clone()),
            access_role_arn: Some(access_role_arn.clone()),
            application_role_arn: self.application_role_arn,
            token_source: Some(token_source.clone()),
            token_exchange: Some(token_exchange.clone()),
            role_assumption: Some(role_assumption.clone()),
            sdk_config,
            cache_policy: self.cache_policy,
            time_source: self.time_source.clone(),
        };

        let mut provider = IdentityEnhancedCredentialsProvider::builder()
            .application_arn(application_arn)
            .access_role_arn(access_role_arn)
            .cache_policy(self.cache_policy);
        provider
            .set_identity_token_source(Some(token_source))
            .set_token_exchange_client(Some(token_exchange))
            .set_role_assumption_client(Some(role_assumption));
        if let Some(time_source) = self.time_source {
            provider = provider.time_source(time_source);
        }

        Ok(TrustedIdentityPropagation {
            provider: provider.build()?,
            settings,
            owned,
        })
    }
}

async fn load_sdk_config(slot: &mut Option<SdkConfig>) -> &SdkConfig {
    let conf = match slot.take() {
        Some(conf) => conf,
        None => {
            debug!("no SdkConfig was set; loading it from the default provider chain");
            aws_config::load_defaults(BehaviorVersion::latest()).await
        }
    };
    slot.insert(conf)
}

/// STS client configuration without credentials.
///
/// `AssumeRoleWithWebIdentity` is unsigned; identity-enhanced `AssumeRole` calls override the
/// credentials per operation.
fn anonymous_sts_config(conf: &SdkConfig) -> aws_sdk_sts::Config {
    let mut config = aws_sdk_sts::config::Builder::from(conf);
    config.set_credentials_provider(None);
    if conf.behavior_version().is_none() {
        config.set_behavior_version(Some(BehaviorVersion::latest()));
    }
    config.build()
}
