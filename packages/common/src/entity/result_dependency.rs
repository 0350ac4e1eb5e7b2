use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Provenance edge: the producer submission a Result was evaluated against,
/// tagged with the project dependency it instantiates. A Result with N
/// edges was run with N extra named input sets.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "result_dependency")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub result_id: i32,
    #[sea_orm(belongs_to, from = "result_id", to = "id")]
    pub result: HasOne<super::result::Entity>,

    pub project_dependency_id: i32,
    #[sea_orm(belongs_to, from = "project_dependency_id", to = "id")]
    pub project_dependency: HasOne<super::project_dependency::Entity>,

    pub producer_submission_id: i32,
    #[sea_orm(belongs_to, from = "producer_submission_id", to = "id")]
    pub producer_submission: HasOne<super::submission::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
