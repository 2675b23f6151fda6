pub mod http;
pub mod mock;
pub mod protocol;
pub mod queue;
pub mod request;
pub mod residency;

pub use http::HttpFetcher;
pub use mock::ScriptedFetcher;
pub use protocol::*;
pub use queue::*;
pub use request::*;
pub use residency::*;
