//! Statistics domains exported by the built-in collectors

mod activity;
mod locks;
mod statements;
mod statio;
mod user_indexes;
mod user_tables;

pub use activity::ACTIVITY;
pub use locks::LOCKS;
pub use statements::STATEMENTS;
pub use statio::{STATIO_USER_INDEXES, STATIO_USER_TABLES};
pub use user_indexes::USER_INDEXES;
pub use user_tables::USER_TABLES;

pub const NAMESPACE: &str = "pg_stat";
pub const NAMESPACE_IO: &str = "pg_statio";
