pub mod cache;
pub mod cancellation;
pub mod client;
pub mod coordinator;
pub mod debounce;
pub mod focus;
pub mod in_flight;

pub use cache::SearchCacheStore;
pub use cancellation::{
    CallId, CancellationCoordinator, IssuedCall, RelatednessPolicy, SearchCancellationToken,
};
pub use client::{Dispatch, Resolution, ResolutionOrigin, SearchClient, SearchOptions};
pub use coordinator::{QueryCoordinator, SearchPhase, SearchState, SettledOutcome};
pub use debounce::{Debouncer, Settled};
pub use focus::{FocusSnapshot, FocusTarget};
pub use in_flight::{InFlightRegistry, Interest, SearchOutcome, SharedSearch};
