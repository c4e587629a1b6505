//! Bluetooth Module
//!
//! Peripheral discovery and connection management on top of btleplug.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   AdapterController                      │
//! │  (scan guard, init order - used by the SessionManager)   │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ dyn BlePlatform
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   BtleplugPlatform                       │
//! └─────────────────────┬───────────────────────────────────┘
//!         ┌─────────────┼─────────────┐
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Scanner  │  │ Connection │  │ Protocol │
//! │ - timed   │  │ - connect  │  │ - UUIDs  │
//! │   scans   │  │ - bonded   │  │ - target │
//! │ - events  │  │   list     │  │   match  │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`platform`] - The [`BlePlatform`] trait and its event type
//! - [`controller`] - [`AdapterController`]
//! - [`protocol`] - Service UUID handling and target-device matching
//! - [`scanner`] - Timed BLE discovery
//! - [`connection`] - Connect, disconnect and bonded listing
//! - [`service`] - btleplug-backed [`BlePlatform`]

pub mod connection;
pub mod controller;
#[cfg(test)]
pub mod fake;
pub mod platform;
pub mod protocol;
pub mod scanner;
pub mod service;

pub use controller::AdapterController;
pub use platform::{BlePlatform, PlatformEvent};
pub use service::BtleplugPlatform;
