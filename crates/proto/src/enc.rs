mod decoder;
mod encoder;

pub use decoder::{FrameDecoder, FrameDecoderError};
pub use encoder::{FrameEncoder, FrameEncoderError};

const FIELD_NAME_EVENT: &str = "event";
const FIELD_NAME_DATA: &str = "data";
