#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate slog;

pub mod collect;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod model;
pub mod pumps;
pub mod sensors;
pub mod util;
