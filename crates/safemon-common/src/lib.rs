//! Types shared by every safemon crate: monitored domains, lookup and scan
//! verdicts, cycle summaries, and id generation.

pub mod id;
pub mod types;
