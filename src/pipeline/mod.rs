pub mod events;
pub mod orchestrator;
pub mod state;

pub use events::ScanEvent;
pub use orchestrator::{build_targets, ScanOrchestrator};
pub use state::{terminal_status, CycleState};
