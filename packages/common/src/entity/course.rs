use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "course")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,

    /// Instructor submissions to producer projects in this course are what
    /// Instructor/Clique dependency edges resolve against.
    pub instructor_id: i32,
    #[sea_orm(belongs_to, from = "instructor_id", to = "id")]
    pub instructor: HasOne<super::person::Entity>,

    #[sea_orm(has_many)]
    pub assignments: HasMany<super::assignment::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
