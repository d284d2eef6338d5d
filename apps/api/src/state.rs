use std::sync::Arc;

use crate::config::Config;
use crate::guidance::service::GuidanceService;
use crate::guidance::store::BundleStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// The one bundle registry for this process; `guidance` holds the same instance.
    pub bundles: Arc<BundleStore>,
    pub guidance: Arc<GuidanceService>,
}
