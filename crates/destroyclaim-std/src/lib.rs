//! Standard extensions and a file-hash storage connector.

pub mod connector;
pub mod extensions;
pub mod index;
pub mod schemas;

pub use connector::DataConnector;
pub use extensions::{
    register_std_extensions, STD_AGENT, STD_DESTRUCTION_LEVEL, STD_FROM_POINT_IN_TIME,
    STD_IN_TIME_INTERVAL, STD_SHA256,
};
pub use index::{sha256_hex, sha256_hex_reader, FileHashIndex};
