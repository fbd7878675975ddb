pub mod error;
pub mod plugin;
pub mod settings;

pub mod cpu {
    pub mod emitter;
    pub mod kernels;
    pub mod sort;
    pub mod spatial_hash;
    pub mod spawn;
    pub mod sph2d;
    pub mod store;
    pub mod time;
}

pub mod gpu {
    pub mod buffers;
    pub mod ffi;
}

pub use error::{FluidError, Result};
pub use plugin::{FluidSimPlugin, FluidSimSet, SimulationCommand, SimulationStepCompleted};
pub use settings::{FluidConfig, FluidSettings};
