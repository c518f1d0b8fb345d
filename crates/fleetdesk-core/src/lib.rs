pub mod activity;
pub mod address;
pub mod company;
pub mod config;
pub mod customer;
pub mod dashboard;
pub mod db;
pub mod delivery;
pub mod delivery_man;
pub mod error;
pub mod geocode;
pub mod item;
pub mod password;
pub mod push;
pub mod types;
pub mod validate;

pub use error::{DeskError, Result};
