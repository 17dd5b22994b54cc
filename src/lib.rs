//! Host-portable half of the RockShield firmware: the compiled-in
//! configuration record and the payload/protocol code shared by the
//! inference and telemetry uplinks.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod constants;
pub mod http;
pub mod inference;
pub mod readings;
pub mod retry;
pub mod thingspeak;
pub mod url;
