//! Generated audio artifacts.

mod store;

pub use store::{ArtifactStore, PendingArtifact, ResolvedArtifact, SynthesisArtifact};
