//! cloudbench-coordinator - cloud resource lifecycle engine for benchmarks
//!
//! This crate provisions the resources a benchmark needs (a network
//! container, client VMs, a managed database), waits for them to become
//! ready, runs the workload and tears everything down again, even when a
//! step fails halfway.

pub mod benchmark;
pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod orchestrator;
pub mod provider;
pub mod resource;
