pub mod backoff;
pub mod shutdown;
pub mod time;

pub use backoff::Backoff;
pub use shutdown::sleep_or_shutdown;
pub use time::{bucket_end, bucket_start};
