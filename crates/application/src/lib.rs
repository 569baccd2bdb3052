//! Application layer - Binding devices to a broker session

pub mod host;

pub use host::{DeviceHost, HostOptions};
