pub mod batchitem;
pub mod collate;
pub mod config;
pub mod encoders;
pub mod index;
pub mod item;
pub mod loader;
pub mod normalizers;
pub mod overwrite;
pub mod sampler;
pub mod store;
pub mod table;
pub mod timeseries;
