use thiserror::Error;

/// Why a submission was refused. Always returned synchronously; the engine
/// never retries on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Every slot of the pool is busy.
    #[error("Pool '{pool}' saturated: all {pool_size} workers busy")]
    Rejected { pool: String, pool_size: usize },

    /// The dispatcher no longer accepts work.
    #[error("Pool '{pool}' is shut down")]
    ShutDown { pool: String },
}

pub type Result<T> = std::result::Result<T, DispatchError>;
