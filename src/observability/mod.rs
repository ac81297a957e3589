// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout the streaming engine. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names consistent between log lines and spans
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - Scheduler and materializer lifecycle events
//! * `messages::stage` - Stage context lifecycle events
//! * `messages::supervision` - Supervision decisions and recovery stages
//! * `messages::cancellation` - Kill switch and injection endpoint events
//!
//! # Usage
//!
//! ```rust
//! use the_streamwood::observability::messages::StructuredLog;
//! use the_streamwood::observability::messages::engine::GraphMaterialized;
//!
//! let msg = GraphMaterialized {
//!     graph_id: 7,
//!     stage_count: 3,
//!     edge_count: 2,
//! };
//!
//! msg.log();
//! ```

pub mod messages;
