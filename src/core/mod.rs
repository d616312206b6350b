mod channel;
pub mod codec;
mod error;
mod payload;
mod request;
mod response;
pub mod transport;

pub use channel::*;
pub use error::*;
pub use payload::*;
pub use request::*;
pub use response::*;
pub use transport::{ClientIdentity, ReqwestTransport, Transport, TransportRequest};
