pub mod company;
pub mod config;
pub mod deliveryman;
pub mod migrate;
pub mod serve;
pub mod user;
