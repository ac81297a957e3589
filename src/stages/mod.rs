// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in stage logic behind the DSL constructors.

pub(crate) mod ask;
pub(crate) mod injection;
mod junctions;
pub(crate) mod kill_switch;
pub(crate) mod recover;
pub(crate) mod sinks;
pub(crate) mod sources;
pub(crate) mod transform;

pub use ask::AskSettings;
pub use injection::{InjectionEndpoint, OfferOutcome, OverflowPolicy};
pub use junctions::{Broadcast, Merge, Zip, ZipWith};
pub use sinks::{Completion, ElementStream};
