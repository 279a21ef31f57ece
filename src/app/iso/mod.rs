pub mod bitmap;
pub mod codec;
pub mod dictionary;
pub mod types;

pub use bitmap::Bitmap;
pub use codec::WireCodec;
pub use dictionary::MessageDictionary;
pub use types::{FieldValue, IsoMessage, IsoType, Scalar};
