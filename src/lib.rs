//! Forward entity state changes to a WordPress site through its REST API.
pub mod config;
pub mod dispatch;
pub mod model;
pub mod publisher;
pub mod registry;
pub mod states;
pub mod status;
pub mod wordpress;
