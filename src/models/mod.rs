pub mod job;
pub mod response;
