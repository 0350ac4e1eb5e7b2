use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One upload event by one student to one project. Immutable once created
/// except for its derived Result set.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub project_id: i32,
    #[sea_orm(belongs_to, from = "project_id", to = "id")]
    pub project: HasOne<super::project::Entity>,

    pub student_id: i32,
    #[sea_orm(belongs_to, from = "student_id", to = "id")]
    pub student: HasOne<super::person::Entity>,

    #[sea_orm(has_many)]
    pub uploads: HasMany<super::upload::Entity>,

    #[sea_orm(has_many)]
    pub results: HasMany<super::result::Entity>,

    /// Orders submissions and drives Latest selection.
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
