mod endpoints;
mod http_transport;
mod retry_policy;

pub use endpoints::Endpoints;
pub use http_transport::HttpTransport;
