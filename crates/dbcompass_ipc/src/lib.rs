mod handler;
mod protocol;

pub use handler::{CoreHandler, default_registry};
pub use protocol::{Request, RequestEnvelope, Response, ResponseEnvelope};
