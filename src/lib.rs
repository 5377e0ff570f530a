//! # Crashtrack Library
//!
//! Location telemetry for a crash-detection service.
//!
//! This library provides the device-side pipeline: sample the device position
//! on a fixed period, submit it to the backend with the user's bearer token,
//! and poll the backend for the latest confirmed reading to drive a live map.

pub mod api;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod poller;
pub mod position;
pub mod presenter;
pub mod sensor;
pub mod session;
pub mod submitter;
