pub mod analytics;
pub mod assessments;
pub mod attendance;
pub mod behaviour;
pub mod boards;
pub mod core;
pub mod setup;
pub mod students;
pub mod teachers;
pub mod timetable;
