// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod builder;
mod port;
mod stage_spec;

pub mod dsl;

pub use builder::{Connection, Graph, GraphBuilder, StageHandle};
pub use dsl::{Flow, Keep, MatHandle, NotUsed, RunnableGraph, Sink, Source};
pub use port::{ElementType, InletRef, OutletRef};
pub use stage_spec::StageSpec;
