//! Session state: the observable snapshot and the state machine that owns it.

pub mod machine;
pub mod snapshot;

pub use machine::{
    default_control_variable, default_treatment_column, AnalysisOutcome, ChannelOutcome,
    CommitStatus, MachineOptions, PatternStateMachine, NO_RECORDS_NOTICE, OVERLAP_NOTICE,
};
pub use snapshot::{Alert, AlertLevel, AnalysisPhase, DashboardState, MapPhase, PatternPhase};
