pub mod analytics_service;
pub mod attempt_service;
pub mod grading_service;
pub mod scheduler_service;
pub mod telemetry_service;
pub mod test_service;
