// Состояние живой сессии: ключи и лог сообщений (только в памяти)

pub mod messages;
pub mod session;

pub use messages::{ChatEntry, MessageLog};
pub use session::{KeySlot, SessionState};
