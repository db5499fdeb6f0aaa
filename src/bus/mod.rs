pub mod client;
pub mod frames;
pub mod handle;
pub mod traits;

pub use client::{EventCallback, HaClient};
pub use frames::{ClimateState, EntityState};
pub use handle::BusHandle;
pub use traits::DeviceBus;
