//! Prometheus metrics for the etcd operator

mod prometheus;

pub use prometheus::*;
