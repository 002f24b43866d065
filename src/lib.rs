//! # fwforge - Firmware Build and Deployment Orchestration
//!
//! fwforge builds a microcontroller firmware image from a vendor-generated
//! source tree, reports how much flash and RAM it uses, and writes it to the
//! device or starts a debug session on it.
//!
//! ## Features
//!
//! - **One ABI**: arch flags live in a single toolchain profile shared by
//!   every translation unit and every configuration
//! - **Deterministic**: sources are resolved into a sorted set and linked in
//!   a fixed order
//! - **Parallel Builds**: translation units compile on a bounded worker pool
//! - **Size Reports**: section, region and symbol tables after every build
//! - **Probe Safety**: flashing and debugging never share the probe
//!
//! ## Quick Start
//!
//! ```bash
//! fwf build --release
//! fwf flash
//! fwf debug
//! ```
//!
//! ## Module Organization
//!
//! - [`toolchain`] - Toolchain profile and flag resolution
//! - [`sources`] - Source set resolution over an abstract filesystem
//! - [`registry`] - Named build targets
//! - [`build`] - Configure/compile/link orchestration
//! - [`analyze`] - Section, region and symbol size analysis
//! - [`deploy`] - Programmer invocation
//! - [`debug`] - GDB server/client bootstrap

/// Size and symbol analysis of linked images.
pub mod analyze;

/// Build orchestration state machine.
pub mod build;

/// CLI command handlers.
pub mod commands;

/// Manifest parsing (`fw.toml`).
pub mod config;

/// Debug server and client startup.
pub mod debug;

/// Flashing through an external programmer.
pub mod deploy;

/// Error and warning types.
pub mod error;

/// Exclusive access to the debug probe.
pub mod probe;

/// External process adapters.
pub mod process;

/// Loaded project state.
pub mod project;

/// Build target registry.
pub mod registry;

/// Source file discovery.
pub mod sources;

/// Toolchain profile.
pub mod toolchain;

/// Terminal UI utilities (tables).
pub mod ui;

pub use error::{Error, Result, Stage, Warning};
