pub mod ws;

pub use ws::{TransportError, WsSink};
