pub mod engine;
pub mod lock;
pub mod states;

pub use engine::{
    missing_assignment_fields, missing_report_fields, DispatchFlow, LifecycleEngine,
    LifecycleError, StatusFlow,
};
pub use lock::{LockError, UnlockPrompt, UnlockWindow, UNLOCK_REASONS};
pub use states::{StatusEvent, StatusOutcome, TransitionContext};
