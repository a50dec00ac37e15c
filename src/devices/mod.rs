pub mod registry;

pub use registry::{DeviceInfo, DeviceInventory, DevicePlatform, DeviceRegistry, MediaAcquirer};
