/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Sources of the identity token issued by the application's external identity provider.

use crate::error::BoxError;
use std::fmt;
use std::sync::Arc;

/// Supplies the identity token (a JWT) that is exchanged for an identity context.
///
/// The token is requested again every time the exchange runs and is never cached, so an
/// implementation may refresh it with its identity provider between calls. The token is not
/// parsed or validated here.
pub trait ProvideIdentityToken: Send + Sync + fmt::Debug {
    /// Returns the current identity token
    fn identity_token(&self) -> Result<String, BoxError>;
}

impl<T> ProvideIdentityToken for Arc<T>
where
    T: ProvideIdentityToken + ?Sized,
{
    fn identity_token(&self) -> Result<String, BoxError> {
        self.as_ref().identity_token()
    }
}

/// A [`ProvideIdentityToken`] implemented by a closure.
///
/// See [`identity_token_fn`] for more details.
#[derive(Copy, Clone)]
pub struct IdentityTokenFn<F> {
    f: F,
}

impl<F> fmt::Debug for IdentityTokenFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityTokenFn")
    }
}

impl<F> ProvideIdentityToken for IdentityTokenFn<F>
where
    F: Fn() -> Result<String, BoxError> + Send + Sync,
{
    fn identity_token(&self) -> Result<String, BoxError> {
        (self.f)()
    }
}

/// Returns a new [`IdentityTokenFn`] with the given closure.
///
/// # Example
///
/// ```
/// use aws_trusted_identity_propagation::token::{identity_token_fn, ProvideIdentityToken};
///
/// let source = identity_token_fn(|| {
///     // fetch or refresh the token with the identity provider here
///     Ok("eyJhbGciOiJSUzI1NiJ9.e30.c2ln".to_string())
/// });
/// assert!(source.identity_token().is_ok());
/// ```
pub fn identity_token_fn<F>(f: F) -> IdentityTokenFn<F>
where
    F: Fn() -> Result<String, BoxError> + Send + Sync,
{
    IdentityTokenFn { f }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closure_is_invoked_on_every_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = identity_token_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{n}"))
        });
        assert_eq!("token-0", source.identity_token().unwrap());
        assert_eq!("token-1", source.identity_token().unwrap());
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn failures_are_returned() {
        let source = identity_token_fn(|| Err("identity provider unreachable".into()));
        let err = source.identity_token().unwrap_err();
        assert_eq!("identity provider unreachable", err.to_string());
    }

    #[test]
    fn debug_does_not_leak_tokens() {
        let source = identity_token_fn(|| Ok("secret".to_string()));
        assert_eq!("IdentityTokenFn", format!("{source:?}"));
    }
}
