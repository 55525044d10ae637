pub mod attempt_service;
pub mod event_bus;
pub mod grading_service;
pub mod test_service;
