#![doc = include_str!("../README.md")]

pub mod asset_state;
pub mod bom;
pub mod equipment;
pub mod identifier;
pub mod manifest;
pub mod plugin;
