#![allow(dead_code)]

pub mod config;
pub mod metrics;
pub mod mock_provider;
pub mod scripted;
