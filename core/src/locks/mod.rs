pub mod coordinator;
pub mod record;

pub use coordinator::{
    LockDataSource, LockDataSubscriber, PendingRerun, RefreshCoordinator, RefreshTicket,
    Subscription,
};
pub use record::{distinct_owners, LockRecord, LockTable, ALL_OWNERS};
