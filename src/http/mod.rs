pub(crate) mod codec;
pub mod multipart;
pub(crate) mod request;
pub(crate) mod response;

pub use multipart::{Files, UploadedFile};
pub use request::{Body, Method, Payload, Request};
pub use response::Response;
