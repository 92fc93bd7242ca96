// Operations module
// Git integration, debouncing, retries and the sync coordinator

pub mod aggregator;
pub mod git;
pub mod operation;
pub mod retry;
pub mod sync;

pub use aggregator::{ChangeAggregator, OperationSink};
pub use git::{CommitInfo, CommitOutcome, Committer, Gateway, GatewayError, GitGateway, InitConfig, RepoStatus};
pub use operation::{SyncOperation, SyncTrigger};
pub use retry::RetryPolicy;
pub use sync::{ManualSyncOutcome, SyncCoordinator, SyncError};
