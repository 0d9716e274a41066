pub mod accountant;
mod machine;
mod record;

pub use machine::SessionStateMachine;
pub use record::{SessionRecord, SessionStatus, SessionType};
