//! rusty-forum/crates/services/src/lib.rs
//!
//! The forum synchronization & reconciliation core: typed live feeds, the
//! vote reconciliation state machine, summary-cache orchestration, and the
//! aggregate that composes them for the presentation layer.

pub mod feed;
pub mod forum;
pub mod summary;
pub mod votes;

pub use feed::TypedFeed;
pub use forum::{filter_and_sort, ForumAggregate, MediaUpload, PostDetail, PostSort, ThreadView};
pub use summary::{
    ExtractiveSummarizer, FallbackChain, RequestOutcome, SubjectSnapshot, SummaryArtifact,
    SummaryOrchestrator, SummaryPolicy, SummaryStatus,
};
pub use votes::{VoteOutcome, VoteReconciler};
