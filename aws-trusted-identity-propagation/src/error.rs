/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Errors returned while building or resolving identity-enhanced credentials.

use std::error::Error as StdError;
use thiserror::Error;

/// A boxed error returned by collaborators: the token source and the remote service clients.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An argument could not be used to derive a value from it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid argument `{name}`: {reason}")]
pub struct InvalidArgument {
    name: &'static str,
    reason: &'static str,
}

impl InvalidArgument {
    pub(crate) fn new(name: &'static str, reason: &'static str) -> Self {
        Self { name, reason }
    }

    /// Name of the rejected argument
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A provider or plugin could not be constructed from the given options.
///
/// Returned before any remote call is made.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// A required option was never set
    #[error("`{0}` is required but was not set")]
    MissingField(&'static str),

    /// An option was set to a value that cannot be used
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
}

/// Resolving identity-enhanced credentials failed.
///
/// Nothing is cached when resolution fails; the next call runs the exchange again.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The identity token could not be obtained or the token exchange rejected it
    #[error("failed to exchange the identity token for application `{application_arn}`")]
    IdentityExchangeFailed {
        /// Application the exchange was attempted for
        application_arn: String,
        #[source]
        source: BoxError,
    },

    /// STS refused to assume the access role with the identity context attached
    #[error("failed to assume role `{role_arn}` with the identity context")]
    RoleAssumptionFailed {
        /// Role that could not be assumed
        role_arn: String,
        #[source]
        source: BoxError,
    },

    /// The token exchange succeeded but its response carried no usable identity context
    #[error("token exchange response did not contain a usable identity context: {reason}")]
    MalformedIdentityContext {
        /// What was wrong with the response
        reason: &'static str,
    },
}

impl ResolveError {
    pub(crate) fn exchange(application_arn: &str, source: impl Into<BoxError>) -> Self {
        ResolveError::IdentityExchangeFailed {
            application_arn: application_arn.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn assume_role(role_arn: &str, source: impl Into<BoxError>) -> Self {
        ResolveError::RoleAssumptionFailed {
            role_arn: role_arn.to_string(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remote_errors_are_kept_as_source() {
        let err = ResolveError::exchange("arn/app", "InvalidGrantException: bad token");
        assert_eq!(
            "InvalidGrantException: bad token",
            err.source().expect("source is kept").to_string()
        );
        assert!(err.to_string().contains("arn/app"));
    }

    #[test]
    fn invalid_argument_is_a_configuration_error() {
        let err: ConfigurationError = InvalidArgument::new("application_arn", "empty").into();
        assert_eq!("invalid argument `application_arn`: empty", err.to_string());
    }
}
