pub mod form;
pub mod optimistic;
pub mod session;
pub mod summary;
pub mod synchronizer;

pub use form::{FormMode, TaskForm};
pub use optimistic::OptimisticTxn;
pub use session::{SessionProvider, SessionState};
pub use summary::{trend_series, BoardSummary, TrendPoint};
pub use synchronizer::{BoardState, SyncPhase, TaskBoard};
