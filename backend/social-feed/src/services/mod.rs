pub mod block_list;
pub mod comments;
pub mod fanout;
pub mod feed;
pub mod feed_session;
pub mod live_query;
pub mod profiles;
pub mod relation_monitor;
pub mod session;
pub mod toggle;

pub use block_list::{BlockListCache, BlockSet};
pub use comments::{CommentOutcome, CommentService};
pub use fanout::NotificationFanout;
pub use feed::{FeedPaginator, FeedSnapshot, PageOutcome};
pub use feed_session::FeedSession;
pub use live_query::LiveQuery;
pub use profiles::ProfileDirectory;
pub use relation_monitor::{RelationMonitor, RelationSet};
pub use session::{SessionContext, StaticSession};
pub use toggle::{CascadeReport, EdgeChange, EdgeToggleEngine, StepStatus, ToggleOutcome};
