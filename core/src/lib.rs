pub mod checkin;
pub mod coerce;
pub mod error;
pub mod keys;
pub mod model;
