pub mod analytics;
pub mod answer;
pub mod question;
pub mod test;
pub mod test_attempt;
