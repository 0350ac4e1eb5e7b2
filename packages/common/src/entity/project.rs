use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::policy::SubmissionPolicy;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "assignment_name")]
    pub assignment_id: i32,
    #[sea_orm(unique_key = "assignment_name")]
    pub name: String,

    #[sea_orm(belongs_to, from = "assignment_id", to = "id")]
    pub assignment: HasOne<super::assignment::Entity>,

    /// Path to the grading script on shared storage. A project without a
    /// script is never dispatched.
    #[sea_orm(nullable)]
    pub script_path: Option<String>,

    /// Wall-clock timeout for one evaluation task, in seconds.
    pub timeout_secs: i32,

    /// Which of a person's submissions count during dependency resolution
    /// when this project is the producer side of an edge.
    pub submission_policy: SubmissionPolicy,

    /// Ordered list of required input filenames, stored as a JSON array
    /// of strings.
    #[sea_orm(column_type = "JsonBinary")]
    pub required_files: serde_json::Value,

    #[sea_orm(has_many)]
    pub submissions: HasMany<super::submission::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
