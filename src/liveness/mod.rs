pub mod completion;
pub mod interpreter;
pub mod mirror;
pub mod poller;
pub mod state;

pub use completion::{generate_display_name, CompletionHandler};
pub use interpreter::{interpret, Signal};
pub use mirror::mirror_directions;
pub use poller::{StatusPoller, StatusReader};
pub use state::{Effect, TaskPhase, TaskStateMachine};
