pub mod applicant;
pub mod job;
pub mod score;

pub use applicant::ApplicantRecord;
pub use job::{JobSpecError, JobSpecification};
pub use score::{RankedResult, Report, Score};
