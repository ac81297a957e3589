// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! A small reactive-streams engine.
//!
//! Graphs of typed stages are described with the [`graph`] DSL, then
//! materialized onto a [`engine::Scheduler`]. Every edge carries credit-based
//! backpressure, so a graph runs in bounded memory no matter how fast its
//! sources are.
//!
//! ```no_run
//! use the_streamwood::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (_scheduler, materializer) = RuntimeBuilder::on_current(&EngineConfig::default())?;
//! let doubled = Source::from_iter(1..=5)
//!     .map(|n: i32| n * 2)
//!     .run_with(Sink::seq(), &materializer)?
//!     .await?;
//! assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
//! # Ok(())
//! # }
//! ```

pub mod config;        // engine config, attributes, runtime builder
pub mod engine;        // edges, scheduler, materializer, supervision
pub mod errors;        // error handling
pub mod graph;         // graph model and typed DSL
pub mod observability;
pub mod stages;        // built-in stage logic
pub mod traits;        // stage and responder abstractions

/// Everything needed to build and run graphs.
pub mod prelude {
    pub use crate::config::{Attributes, EngineConfig, RuntimeBuilder};
    pub use crate::engine::{
        Decider, KillSwitches, MaterializedGraph, Materializer, Scheduler, SharedKillSwitch,
        SupervisionDecision, UniqueKillSwitch,
    };
    pub use crate::errors::{StageRuntimeError, TerminationError};
    pub use crate::graph::{Flow, GraphBuilder, Keep, NotUsed, RunnableGraph, Sink, Source};
    pub use crate::stages::{
        AskSettings, Broadcast, Completion, ElementStream, InjectionEndpoint, Merge,
        OverflowPolicy, Zip, ZipWith,
    };
    pub use crate::traits::{FnResponder, Responder};
}
