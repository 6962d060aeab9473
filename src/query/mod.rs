pub mod insights;
pub mod period;
