/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use aws_credential_types::Credentials;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Single slot holding the most recently resolved credentials.
///
/// Loading goes through [`OnceCell::get_or_try_init`] so concurrent callers hitting an empty
/// slot wait on one load instead of starting their own. A failed load leaves the slot empty.
#[derive(Clone, Debug)]
pub(crate) struct Cache {
    value: Arc<RwLock<OnceCell<Credentials>>>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Cache {
            value: Arc::new(RwLock::new(OnceCell::new())),
        }
    }

    pub(crate) async fn get(&self) -> Option<Credentials> {
        self.value.read().await.get().cloned()
    }

    pub(crate) async fn get_or_load<F, Fut, E>(&self, f: F) -> Result<Credentials, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Credentials, E>>,
    {
        let lock = self.value.read().await;
        let future = lock.get_or_try_init(f);
        future.await.cloned()
    }

    /// Empties the slot if `is_stale` holds for the credentials in it. Returns true if the
    /// slot was emptied.
    pub(crate) async fn clear_if(&self, is_stale: impl Fn(&Credentials) -> bool) -> bool {
        let mut lock = self.value.write().await;

        // Another caller may have already replaced the stale credentials while we waited for
        // the write lock; only clear what is still stale.
        match lock.get() {
            Some(credentials) if is_stale(credentials) => {
                *lock = OnceCell::new();
                true
            }
            _ => false,
        }
    }
}
