//! Application context.
//!
//! [`AppContext`] is the central struct shared across all route handlers via
//! Axum state and by the finalize workers. It holds only `Arc`s and the r2d2
//! pool, so cloning is cheap.

use std::sync::Arc;

use vs_av::MediaTools;
use vs_core::config::Config;
use vs_db::pool::DbPool;

use crate::derivatives::DerivativeGenerator;
use crate::storage::AssetStorage;

#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// On-disk asset layout.
    pub storage: Arc<AssetStorage>,
    /// Media tools used for probing and frame capture.
    pub tools: Arc<dyn MediaTools>,
}

impl AppContext {
    pub fn new(
        db: DbPool,
        config: Config,
        storage: AssetStorage,
        tools: Arc<dyn MediaTools>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            storage: Arc::new(storage),
            tools,
        }
    }

    /// Derivative generator bound to this context's tools and settings.
    pub fn derivatives(&self) -> DerivativeGenerator {
        DerivativeGenerator::new(
            self.tools.clone(),
            self.storage.clone(),
            self.config.derivatives.clone(),
        )
    }
}
