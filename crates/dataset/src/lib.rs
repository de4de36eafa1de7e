//! C-MAPSS test-set access for the simulation endpoint.

mod cmapss;
mod store;

pub use cmapss::{
    COLUMN_COUNT, Dataset, DatasetError, FEATURE_COUNT, SEQUENCE_LEN, Sample, Unit,
};
pub use store::SampleStore;
