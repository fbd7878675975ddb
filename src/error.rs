/// Everything that can go wrong while configuring the simulation.
/// Stepping itself never fails, all state is in memory.
#[derive(Debug, thiserror::Error)]
pub enum FluidError {
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfiguration {
        field: &'static str,
        reason: &'static str,
    },
    #[error("spawn data mismatch: {positions} positions but {velocities} velocities")]
    SpawnDataMismatch { positions: usize, velocities: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

pub type Result<T> = std::result::Result<T, FluidError>;
