// =============================================================================
// Model — stacked ensemble bundles, registry and inference
// =============================================================================

pub mod bundle;
pub mod calibrator;
pub mod classifier;
pub mod inference;
pub mod probabilities;
pub mod registry;

pub use bundle::{ModelBundle, NamedModel};
pub use calibrator::Calibrator;
pub use classifier::{Classifier, StandardScaler};
pub use inference::{EnsembleInferenceEngine, Prediction};
pub use probabilities::ClassProbabilities;
pub use registry::{ActivePointer, BundleRef, ModelRegistry};
