//! Network debug view
//!
//! Subscribes to the storefront's relay endpoint, folds the timing events
//! into `ServerEvents` and renders them as a request waterfall.

pub mod aggregator;
pub mod batch;
pub mod subscription;
pub mod view;
pub mod waterfall;

pub use aggregator::{is_self_traffic, ServerEvents};
pub use batch::next_batch;
pub use subscription::NetworkSubscription;
pub use view::NetworkView;
pub use waterfall::{build_waterfall, MainRequestRow, SubRequestRow};
