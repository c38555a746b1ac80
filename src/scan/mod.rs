pub mod events;
pub mod orchestrator;
pub mod record;
pub mod state_machine;
pub mod stats;

pub use events::{event_channel, EventSink, InspectionEvent};
pub use orchestrator::{InspectionOrchestrator, RunConfig, RunOutcome};
pub use record::InspectionRecord;
pub use state_machine::{RunState, RunStateMachine, Trigger};
pub use stats::{RunningStats, StatsAggregator, StatsConfig};
