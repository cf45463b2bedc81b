//! Disruption and convergence verification engine.
//!
//! Every component receives its cluster capability and clock at
//! construction. Waits re-read the cluster on every attempt.

pub mod chaos;
pub mod clock;
pub mod cluster;
pub mod disruption;
pub mod error;
pub mod phase;
pub mod poller;
pub mod report;

pub use chaos::{ChaosScenarioReport, ChaosTarget, FaultInjectionManager, TeardownReport};
pub use clock::{Clock, ManualClock, TokioClock};
pub use cluster::{ClusterClient, ClusterError, FakeCluster, KubeCluster};
pub use disruption::{DisruptionOrchestrator, RunAborted, node_recovery_timeout};
pub use error::{CleanupWarning, EngineError, ParseError, SetupStage};
pub use phase::{PhaseWaitOutcome, PhaseWaiter};
pub use poller::{PollOutcome, Poller, CheckError};
pub use report::{
    CollectingReporter, DisruptionRunReport, NodeDisruptionRecord, NodeOutcome, Reporter,
    ScenarioReport, TracingReporter, WorkloadScenarioReport,
};
