pub mod factory;
pub mod presto;
pub mod recorder;
pub mod workload;
