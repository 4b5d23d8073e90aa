pub mod notice;
pub mod subscription;

pub use notice::{Notice, UNKNOWN_BASE_SCORE};
pub use subscription::{FilterRule, NotifyList, Subscriber};
