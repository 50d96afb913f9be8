//! Application services

mod network;

pub use network::{NetworkOptions, RoamingNetwork};
