pub mod liveness;

pub use liveness::{ProcessProbe, SystemProbe, TerminateOutcome};
