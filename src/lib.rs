// Copyright 2025 The cilgraph authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # cilgraph
//!
//! The metadata and type resolution engine of an ahead-of-time compiler front end for
//! managed (.NET) binaries. `cilgraph` consumes raw unit descriptors - types, fields,
//! methods with bodies, properties, modules - from an external loader and drives them to a
//! fully resolved, cross-referenced type-system graph, ready for intermediate-representation
//! lowering.
//!
//! ## What it does
//!
//! - **Concurrent, order-insensitive resolution** - a multi-producer/multi-consumer work
//!   queue feeds a pool of resolver workers; units hitting a not-yet-resolvable dependency
//!   are re-enqueued until the whole set converges, so forward references across types need
//!   no up-front ordering.
//! - **Generic substitution** - every generic-bearing operand is rewritten through a
//!   per-invocation [`metadata::typesystem::GenericArgumentResolver`], closing open
//!   signatures against type- and method-level bindings while preserving legitimately open
//!   parameters.
//! - **Method body resolution** - instruction streams are decoded operand by operand into
//!   graph handles: types, fields, methods, generic instantiations, locals, branch targets,
//!   interned strings and exception regions.
//! - **Interface and array synthesis** - a post-fixed-point pass propagates interface
//!   implementations down inheritance chains and materializes member sets for
//!   single-dimension array types by specializing the shared generic array helper.
//!
//! ## Architecture
//!
//! - [`metadata::typesystem::UnitGraph`] - the canonical, exclusively owning store of all
//!   entities, with scoped per-entity mutators
//! - [`metadata::resolver::MetadataResolver`] - the work-queue scheduler and pass driver
//! - [`metadata::descriptors`] - the loader-facing raw descriptor model
//! - [`prelude`] - convenient re-exports of the common surface
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cilgraph::prelude::*;
//!
//! let graph = Arc::new(UnitGraph::new());
//! let resolver = MetadataResolver::new(graph.clone());
//!
//! // A loader would register its discovered units and enqueue them here.
//! let stats = resolver.resolve()?;
//! assert_eq!(stats.resolved, 0);
//! # Ok::<(), cilgraph::Error>(())
//! ```
//!
//! ## Concurrency model
//!
//! The unit graph is the only shared mutable resource. Mutation is scoped per entity:
//! acquiring a mutator for one unit never blocks mutation of another, and a second mutator
//! for the *same* unit blocks until the first scope exits. Counters are atomic; readers must
//! only trust a unit's derived fields after observing its resolved flag.
//!
//! ## Error handling
//!
//! All operations return [`Result<T, Error>`](Result). Transient faults are invisible to
//! callers (the driver retries them, up to a budget); structural and configuration faults
//! abort the run with a diagnostic naming the offending token or missing well-known type.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilgraph::prelude::*;
///
/// let graph = UnitGraph::new();
/// assert!(graph.get_type_by_name("System", "Int32").is_some());
/// ```
pub mod prelude;

/// Metadata model and resolution machinery; see the module docs for the full map.
pub mod metadata;

/// `cilgraph` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always
/// [`Error`]. Used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `cilgraph` Error type
///
/// The main error type for all operations in this crate, covering transient resolution
/// faults, structural metadata inconsistencies, fatal configuration faults and contract
/// violations.
pub use error::Error;
