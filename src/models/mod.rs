pub mod batch;
pub mod course;
pub mod enrollment;

pub use batch::{AllBatchSchedulesResponse, BatchSchedule, BatchScheduleView, CourseBatchSchedulesResponse, CourseBatches, NewBatchSchedule};
pub use course::{
    Course, CourseDetail, CourseSummary, CurriculumInfo, Highlight, Module, ModuleDetail, NewCourse,
    NewOverview, Overview, Topic,
};
pub use enrollment::{
    EnrollmentRecord, EnrollmentRequest, EnrollmentResponse, NewEnrollment, SideEffectReport,
    SideEffectResult, VerifyEmailRequest, VerifyEmailResponse,
};
