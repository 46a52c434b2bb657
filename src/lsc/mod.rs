pub mod encoder;
pub mod status;

pub use encoder::encode_request;
pub use status::{classify_record, read_status};
