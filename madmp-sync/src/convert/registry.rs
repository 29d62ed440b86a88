//! Ordered converter list with a mandatory fallback

use std::sync::Arc;

use madmp_common::madmp::{Dataset, Dmp};
use madmp_common::MadmpConfig;

use super::{GenericRecordConverter, RdmRecordConverter, RecordConverter};
use crate::error::{SyncError, SyncResult};
use crate::repository::Record;

/// First-match-wins converter selection
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn RecordConverter>>,
    fallback: Arc<dyn RecordConverter>,
}

impl ConverterRegistry {
    pub fn new(converters: Vec<Arc<dyn RecordConverter>>, fallback: Arc<dyn RecordConverter>) -> Self {
        Self {
            converters,
            fallback,
        }
    }

    /// Build the converters named in `sync.record_converters`, in order
    pub fn from_config(config: &Arc<MadmpConfig>) -> SyncResult<Self> {
        let converters = config
            .sync
            .record_converters
            .iter()
            .map(|name| build(name, config))
            .collect::<SyncResult<Vec<_>>>()?;
        let fallback = build(&config.sync.fallback_record_converter, config)?;

        Ok(Self::new(converters, fallback))
    }

    pub fn for_dataset(&self, dataset: &Dataset, dmp: &Dmp) -> Arc<dyn RecordConverter> {
        self.converters
            .iter()
            .find(|c| c.matches_dataset(dataset, dmp))
            .unwrap_or(&self.fallback)
            .clone()
    }

    pub fn for_record(&self, record: &Record) -> Arc<dyn RecordConverter> {
        self.converters
            .iter()
            .find(|c| c.matches_record(record))
            .unwrap_or(&self.fallback)
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    pub fn fallback_name(&self) -> &'static str {
        self.fallback.name()
    }
}

fn build(name: &str, config: &Arc<MadmpConfig>) -> SyncResult<Arc<dyn RecordConverter>> {
    match name.trim() {
        RdmRecordConverter::NAME => Ok(Arc::new(RdmRecordConverter::new(config.clone()))),
        GenericRecordConverter::NAME => Ok(Arc::new(GenericRecordConverter::new(config.clone()))),
        other => Err(SyncError::ConverterNotFound(other.to_string())),
    }
}
