/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Identity-enhanced AWS credentials through trusted identity propagation.
//!
//! An identity token issued by an external identity provider is exchanged with IAM Identity
//! Center for an identity context, which is then attached to an STS `AssumeRole` call. The
//! resulting credentials act on behalf of the end user the token was issued to, rather than
//! a generic service identity.
//!
//! Start with [`TrustedIdentityPropagation::builder`] to attach the credentials to SDK clients,
//! or [`IdentityEnhancedCredentialsProvider::builder`] to supply both remote clients yourself.

#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod bootstrap;
pub mod client;
pub mod error;
pub mod plugin;
pub mod provider;
pub mod session_name;
pub mod token;

pub use plugin::TrustedIdentityPropagation;
pub use provider::IdentityEnhancedCredentialsProvider;
