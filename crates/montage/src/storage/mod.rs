pub mod artifacts;

pub use artifacts::{ArtifactHandle, ArtifactKind, ArtifactStore};
