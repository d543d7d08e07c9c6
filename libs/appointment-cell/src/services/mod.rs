pub mod appointments;
pub mod completion;
pub mod lifecycle;
pub mod queue;
