mod device_host;

pub use device_host::{DeviceHost, HostOptions};
