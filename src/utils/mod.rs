pub mod http;
pub mod logging;
pub mod schedule;
pub mod timing;
