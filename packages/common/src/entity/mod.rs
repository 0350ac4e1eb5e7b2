pub mod assignment;
pub mod course;
pub mod enrollment;
pub mod person;
pub mod project;
pub mod project_dependency;
pub mod result;
pub mod result_dependency;
pub mod student_dependency;
pub mod submission;
pub mod upload;
