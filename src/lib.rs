//! # lockq
//!
//! Arbitrates one physical actuator among many remote requesters.
//!
//! Requesters submit numbered actions and wait for the outcome; the device
//! pulls work one item at a time and reports back. The queue is strict FIFO
//! with at most one item in flight, backed by Postgres or by memory.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod http;
pub mod model;
pub mod storage;
pub mod telemetry;
