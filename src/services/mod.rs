pub mod catalog;
pub mod enrollment;

pub use catalog::CatalogService;
pub use enrollment::EnrollmentService;
