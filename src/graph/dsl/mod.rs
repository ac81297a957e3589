// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed composition on top of [`GraphBuilder`](crate::graph::GraphBuilder).
//!
//! `Source`, `Flow` and `Sink` are partial graphs with one open port on each
//! open side; composing them with `via`/`to` checks element types at compile
//! time, and `*_mat` variants choose which materialized value survives with a
//! [`Keep`] combiner.

mod flow;
mod mat;
mod runnable;
mod sink;
mod source;

pub use flow::Flow;
pub use mat::{Keep, MatHandle, NotUsed};
pub use runnable::RunnableGraph;
pub use sink::Sink;
pub use source::Source;
