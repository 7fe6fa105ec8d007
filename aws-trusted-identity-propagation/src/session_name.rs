/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Role session names derived from an application ARN.
//!
//! Sessions are labeled so that CloudTrail distinguishes the bootstrap session, used only to
//! call the token exchange, from the identity-enhanced session handed to the caller.

use crate::error::InvalidArgument;

const BOOTSTRAP_SESSION_PREFIX: &str = "TIPSDKPluginSession-";
const IDENTITY_ENHANCED_SESSION_PREFIX: &str = "TIPSDKPluginIdentityEnhancedSession-";

/// Returns the part of `application_arn` after its last `/`.
///
/// An identifier without a `/` is returned unchanged. Returns `None` for an empty identifier.
///
/// ```
/// use aws_trusted_identity_propagation::session_name::application_id;
/// assert_eq!(
///     Some("apl-5678"),
///     application_id("arn:aws:sso::123456789012:application/ssoins-1234/apl-5678")
/// );
/// ```
pub fn application_id(application_arn: &str) -> Option<&str> {
    if application_arn.is_empty() {
        return None;
    }
    application_arn.rsplit('/').next()
}

/// Session name for the bootstrap role assumed to authenticate the token exchange
pub fn bootstrap_session_name(application_arn: &str) -> Result<String, InvalidArgument> {
    prefixed(BOOTSTRAP_SESSION_PREFIX, application_arn)
}

/// Session name for the identity-enhanced session returned to the caller
pub fn identity_enhanced_session_name(application_arn: &str) -> Result<String, InvalidArgument> {
    prefixed(IDENTITY_ENHANCED_SESSION_PREFIX, application_arn)
}

fn prefixed(prefix: &str, application_arn: &str) -> Result<String, InvalidArgument> {
    match application_id(application_arn) {
        Some(id) if !id.is_empty() => Ok(format!("{prefix}{id}")),
        _ => Err(InvalidArgument::new(
            "application_arn",
            "an application id cannot be derived from an empty identifier",
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn application_id_is_last_path_segment() {
        assert_eq!(Some("suffix"), application_id("prefix/suffix"));
        assert_eq!(
            Some("apl-1234567891234567"),
            application_id(
                "arn:aws:sso::123456789101:application/ssoins-1234567891234567/apl-1234567891234567"
            )
        );
    }

    #[test]
    fn application_id_without_separator() {
        assert_eq!(Some("my-app"), application_id("my-app"));
        assert_eq!(None, application_id(""));
    }

    #[test]
    fn session_names() {
        assert_eq!(
            "TIPSDKPluginSession-app1",
            bootstrap_session_name("arn/app1").unwrap()
        );
        assert_eq!(
            "TIPSDKPluginIdentityEnhancedSession-app1",
            identity_enhanced_session_name("arn/app1").unwrap()
        );
    }

    #[test]
    fn empty_application_is_rejected() {
        assert_eq!("application_arn", bootstrap_session_name("").unwrap_err().name());
        // a trailing separator leaves nothing to label the session with
        assert!(identity_enhanced_session_name("arn/").is_err());
    }
}
