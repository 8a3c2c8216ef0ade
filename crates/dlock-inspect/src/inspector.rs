//! Entry point binding iterators to one engine.

use std::sync::Arc;

use crate::config::ScanConfig;
use crate::engine::LockSys;
use crate::lock_iter::DataLockIterator;
use crate::lock_wait_iter::DataLockWaitIterator;
use crate::observability::{ScanObserver, SharedObserver};
use crate::table_path::{FilenameTablePaths, TablePathResolver};

/// Factory of scan sessions over one engine. Every iterator it creates has
/// its own independent scan state.
pub struct DataLockInspector<E: LockSys> {
    engine: Arc<E>,
    config: ScanConfig,
    resolver: Arc<dyn TablePathResolver>,
    observer: SharedObserver,
}

impl<E: LockSys> DataLockInspector<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            config: ScanConfig::default(),
            resolver: Arc::new(FilenameTablePaths),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TablePathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn config(&self) -> ScanConfig {
        self.config
    }

    pub fn lock_iterator(&self) -> DataLockIterator<E> {
        DataLockIterator::with_config(Arc::clone(&self.engine), self.config)
            .with_resolver(Arc::clone(&self.resolver))
            .with_shared_observer(self.observer.clone())
    }

    pub fn lock_wait_iterator(&self) -> DataLockWaitIterator<E> {
        DataLockWaitIterator::with_config(Arc::clone(&self.engine), self.config)
            .with_shared_observer(self.observer.clone())
    }
}

impl<E: LockSys> Clone for DataLockInspector<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: self.config,
            resolver: Arc::clone(&self.resolver),
            observer: self.observer.clone(),
        }
    }
}
