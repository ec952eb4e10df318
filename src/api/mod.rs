pub mod client;
pub mod errors;

pub use client::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use errors::{analyze_error_response, ErrorClassification, ErrorReport};
