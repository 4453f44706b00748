//! Shared application state handed to every route through an `Extension`.

use std::sync::Arc;

use crate::catalog::ServiceCatalog;
use crate::comments::CommentLog;
use crate::config::AppConfig;
use crate::ledger::PaymentLedger;
use crate::lifecycle::LifecycleEngine;
use crate::notifications::NotificationDispatcher;
use crate::queries::QueryLayer;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub engine: Arc<LifecycleEngine>,
    pub queries: QueryLayer,
    pub catalog: ServiceCatalog,
    pub comments: CommentLog,
    pub notifier: NotificationDispatcher,
}

impl AppState {
    /// Wire every component to the same store.
    pub fn new(store: Arc<dyn EntityStore>, config: &AppConfig) -> Self {
        let notifier = NotificationDispatcher::new(store.clone());
        let ledger = PaymentLedger::new(store.clone(), config.payment_grace_days);
        let engine = LifecycleEngine::new(store.clone(), notifier.clone(), ledger);
        Self {
            queries: QueryLayer::new(store.clone()),
            catalog: ServiceCatalog::new(store.clone()),
            comments: CommentLog::new(store.clone()),
            engine: Arc::new(engine),
            notifier,
            store,
        }
    }
}
