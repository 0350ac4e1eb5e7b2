use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::policy::DependencyStructure;

/// Directed edge from a producer project to a consumer project: grading the
/// consumer needs submissions made to the producer.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_dependency")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Consumer project: the one whose grading runs need the inputs.
    #[sea_orm(unique_key = "consumer_producer")]
    pub project_id: i32,
    /// Producer project: the one whose submissions are read. Plain column;
    /// a second relation to `project` would clash with the consumer one.
    #[sea_orm(unique_key = "consumer_producer")]
    pub producer_id: i32,

    #[sea_orm(belongs_to, from = "project_id", to = "id")]
    pub project: HasOne<super::project::Entity>,

    pub structure: DependencyStructure,

    /// Parameter name the grading script knows this input set by.
    pub keyword: String,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
