//! Routing and diagnostics engine for Intent Hub.
//!
//! Given a free-text utterance, the engine selects zero or more named
//! routes whose example utterances are nearest in embedding space, subject
//! to per-route acceptance thresholds. It owns:
//!
//! - the route data model and its invariants ([`types`], [`store`])
//! - embedding providers ([`embeddings`])
//! - vector index backends ([`index`])
//! - incremental index synchronization ([`sync`])
//! - query prediction ([`predict`])
//! - overlap diagnostics and 2-D projection ([`diagnostics`])

pub mod cancel;
pub mod diagnostics;
pub mod embeddings;
pub mod index;
pub mod point;
pub mod predict;
pub mod store;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use diagnostics::DiagnosticsEngine;
pub use embeddings::Embedder;
pub use index::{PointFilter, VectorIndex};
pub use predict::Predictor;
pub use store::RouteStore;
pub use sync::{Synchronizer, SyncMode, SyncReport};
pub use types::{Prediction, Route};
