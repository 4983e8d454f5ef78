pub mod availability;
pub mod booked;
pub mod booking;
pub mod lifecycle;
pub mod slots;
pub mod watch;
