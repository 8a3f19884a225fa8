pub mod booking;
pub mod conflict;
pub mod feedback;
pub mod lifecycle;
