pub mod controller;
pub mod snapshot;

pub use controller::LivenessOrchestrator;
pub use snapshot::AttemptSnapshot;
