mod dispatcher;
mod formatting;
mod push;
mod telegram;

pub use dispatcher::Dispatcher;
pub use push::PushRelay;
pub use telegram::TelegramSender;
