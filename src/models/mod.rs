pub mod assignment;
pub mod driver;
pub mod earnings;
pub mod event;
pub mod job;
