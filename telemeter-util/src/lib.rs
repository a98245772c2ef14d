//! Helper types used alongside `telemeter`.
//!
//! - [`Registry`]: sharded, read-optimized storage of metrics keyed by [`Id`][telemeter::Id].
//! - [`MemoryBackend`]: a [`Backend`][telemeter::Backend] keeping every metric in memory, with
//!   [`Snapshotter`] for point-in-time raw values and [`MemoryBackend::measurements`] for the
//!   flattened, exporter-shaped view.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod debugging;
pub use debugging::{DebugValue, Snapshot, Snapshotter};

mod kind;
pub use kind::{CompositeKey, MetricKind};

mod memory;
pub use memory::{Measurement, MemoryBackend, STATISTIC_TAG};

mod registry;
pub use registry::Registry;

mod storage;
pub use storage::{AtomicStorage, Storage};
