pub mod api_keys;
pub mod checkin;
pub mod health;
pub mod inventory;
pub mod machines;
pub mod registry;
pub mod tenancy;
