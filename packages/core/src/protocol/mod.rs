// Протокол обмена с сервером
//
// messages/wire - формат сообщений, session - автомат без I/O,
// transport/driver - асинхронная обвязка (feature "desktop").

#[cfg(feature = "desktop")]
pub mod driver;
pub mod messages;
pub mod session;
#[cfg(feature = "desktop")]
pub mod transport;
pub mod validation;
pub mod wire;

pub use messages::{ClientMessage, ServerMessage};
pub use session::{Channel, Phase, SessionAction, SessionProtocol};
