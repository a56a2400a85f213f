pub mod adapter;
pub mod framing;
pub mod inbound_queue;
pub mod protocol;
pub mod session;
