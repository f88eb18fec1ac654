// Copyright 2026 Billburner Contributors
// SPDX-License-Identifier: Apache-2.0

//! Billburner runtime library: browser, mailbox and InfluxDB adapters plus
//! the provider catalog.
//!
//! This library crate exposes the binary's modules for integration testing.

pub mod browser;
pub mod cli;
pub mod config;
pub mod influx;
pub mod mail;
pub mod providers;
