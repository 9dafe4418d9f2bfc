pub mod telegram;

pub use telegram::{TelegramChannel, DEFAULT_API_BASE};
