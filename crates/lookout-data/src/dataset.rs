//! The Dataset Store: feeds plus encoder/decoder parameters.

use serde::Serialize;

use crate::params::ParameterSet;
use crate::table::FeedTable;

/// Immutable bundle of everything the tools can read.
///
/// Shared behind an `Arc` once loaded; no locking is needed.
#[derive(Debug, Clone)]
pub struct Dataset {
    feeds: FeedTable,
    encoder: ParameterSet,
    decoder: ParameterSet,
}

/// Counts reported by health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub feeds_loaded: usize,
    pub feed_columns: usize,
    pub encoder_params: usize,
    pub decoder_params: usize,
}

impl Dataset {
    pub fn new(feeds: FeedTable, encoder: ParameterSet, decoder: ParameterSet) -> Self {
        Self {
            feeds,
            encoder,
            decoder,
        }
    }

    pub fn feeds(&self) -> &FeedTable {
        &self.feeds
    }

    pub fn encoder(&self) -> &ParameterSet {
        &self.encoder
    }

    pub fn decoder(&self) -> &ParameterSet {
        &self.decoder
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            feeds_loaded: self.feeds.len(),
            feed_columns: self.feeds.columns().len(),
            encoder_params: self.encoder.len(),
            decoder_params: self.decoder.len(),
        }
    }
}
