//! Domain model (IDs, task, envelope, plan, replies, decisions, errors).

pub mod audit;
pub mod decision;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod plan;
pub mod policy;
pub mod reply;
pub mod status;
pub mod submission;
pub mod task;

pub use audit::DecisionRecord;
pub use decision::{Decider, Decision, DefaultDecider, Signal};
pub use envelope::{Envelope, ExecutionMode, TtlExhausted};
pub use errors::{CollaboratorError, CourierError, StoreError};
pub use ids::{ParseIdError, SessionId, TaskId};
pub use outcome::{
    Artifact, ExecutionReport, ObservationPhase, StepDisposition, StepOutcome, StepReport,
};
pub use plan::{Plan, PlanStep, StepMode};
pub use policy::EscalationPolicy;
pub use reply::{Analysis, Classification, Complexity, Verdict, Verification, parse_reply};
pub use status::TaskStatus;
pub use submission::{NewTask, ValidSubmission};
pub use task::{DocumentRef, Task, TaskType};
