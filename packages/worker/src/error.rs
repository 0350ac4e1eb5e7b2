use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("Project {project_id} has no grading script")]
    MissingScript { project_id: i32 },

    /// Two staged inputs declared the same logical filename. Nothing is
    /// overwritten; the task fails with the offending name.
    #[error("Staging conflict: duplicate logical filename '{filename}'")]
    StagingConflict { filename: String },

    /// The provenance walk for a Result reached its own root submission.
    #[error("Provenance cycle: result {result_id} transitively depends on its own submission")]
    ProvenanceCycle { result_id: i32 },
}

impl WorkerError {
    /// Whether retrying the same job could succeed. Configuration and data
    /// integrity errors never benefit from a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkerError::Db(_) | WorkerError::Io(_))
    }
}
