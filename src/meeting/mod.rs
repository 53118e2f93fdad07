pub mod events;
pub mod functions;
pub mod state;

pub use events::{EventBus, MeetingEvent};
pub use functions::register_meeting_functions;
pub use state::{
    ActionItem, ActionStatus, AgendaPoint, AgendaPointUpdate, MeetingCounts, MeetingState, Urgency,
};
