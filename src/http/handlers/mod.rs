pub mod health;
pub mod sessions;
pub mod socket;
pub mod users;
