pub mod wire;
pub mod encoder;
pub mod decoder;

pub use encoder::{encode, encode_delimited, encoded_len};
pub use decoder::{decode, decode_delimited};
