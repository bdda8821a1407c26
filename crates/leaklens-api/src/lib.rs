pub mod handlers;
pub mod router;

use std::sync::Arc;

use leaklens_batch::{
    BatchConfig, CredentialClassifier, JobProcessor, JobStore, processor::ProcessorSettings,
};

/// Shared state behind every route: the job table, the processor that feeds it,
/// and the classifier used for single checks.
#[derive(Clone)]
pub struct LeakLensSys {
    config: Arc<BatchConfig>,
    store: JobStore,
    processor: JobProcessor,
}

impl LeakLensSys {
    pub fn new(config: BatchConfig, classifier: Arc<dyn CredentialClassifier>) -> Self {
        let store = JobStore::new(&config);
        let processor = JobProcessor::new(
            store.clone(),
            classifier,
            ProcessorSettings::from(&config),
        );

        Self {
            config: Arc::new(config),
            store,
            processor,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn store(&self) -> JobStore {
        self.store.clone()
    }

    pub fn processor(&self) -> &JobProcessor {
        &self.processor
    }

    pub fn classifier(&self) -> Arc<dyn CredentialClassifier> {
        self.processor.classifier()
    }
}
