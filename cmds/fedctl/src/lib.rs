pub mod adapter;
pub mod cli;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod k8s;
pub mod telemetry;
pub mod units;
