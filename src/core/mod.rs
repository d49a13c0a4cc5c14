pub mod baseline;
pub mod rcu;
pub mod readers;
mod retire;

pub use crate::domain::ports::Protect;
pub use baseline::{ArcProtected, MutexProtected, RwLockProtected};
pub use rcu::{hardware_concurrency, Rcu, RcuBuilder, RcuStats, ReadGuard};
pub use readers::ReaderRegistry;
