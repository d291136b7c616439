//! Static capability profiles keyed by model-name patterns.

mod builtin;
mod profile;
mod registry;

pub use profile::{ModelProfile, ProfileCapability, ThinkingFormat};
pub use registry::{ModelProfileRegistry, ProfileTier};
