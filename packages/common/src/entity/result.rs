use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of one evaluation task. Created pending (null return code) by
/// the task builder; finalized exactly once by the sandbox executor, which
/// owns all writes after creation.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "result")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub submission_id: i32,
    #[sea_orm(belongs_to, from = "submission_id", to = "id")]
    pub submission: HasOne<super::submission::Entity>,

    #[sea_orm(column_type = "Text")]
    pub stdout: String,
    #[sea_orm(column_type = "Text")]
    pub stderr: String,

    /// Null means pending (not yet run).
    #[sea_orm(nullable)]
    pub return_code: Option<i32>,

    #[sea_orm(has_many)]
    pub dependencies: HasMany<super::result_dependency::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
