use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Administrator-curated (student, producer person) pair for a Custom
/// dependency edge. Stored so custom groupings can be staged, but the
/// resolver currently rejects Custom edges with a typed error.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "student_dependency")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "student_dep_producer")]
    pub student_id: i32,
    #[sea_orm(unique_key = "student_dep_producer")]
    pub dependency_id: i32,
    /// Plain column; a second relation to `person` would clash with the
    /// student one.
    #[sea_orm(unique_key = "student_dep_producer")]
    pub producer_person_id: i32,

    #[sea_orm(belongs_to, from = "student_id", to = "id")]
    pub student: HasOne<super::person::Entity>,
    #[sea_orm(belongs_to, from = "dependency_id", to = "id")]
    pub dependency: HasOne<super::project_dependency::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
