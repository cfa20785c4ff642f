// SPDX-License-Identifier: MPL-2.0

use crate::cascade::CascadeCoordinator;
use crate::content::ContentService;
use crate::ledger::EngagementLedger;
use crate::projector::CounterProjector;
use crate::store::Store;
use std::sync::Arc;

/// Shared handles for request handlers. Every service talks to the same store.
pub struct AppState {
    pub ledger: EngagementLedger,
    pub projector: CounterProjector,
    pub cascade: CascadeCoordinator,
    pub content: ContentService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Arc<Self> {
        Arc::new(Self {
            ledger: EngagementLedger::new(store.clone()),
            projector: CounterProjector::new(store.clone()),
            cascade: CascadeCoordinator::new(store.clone()),
            content: ContentService::new(store),
        })
    }
}
