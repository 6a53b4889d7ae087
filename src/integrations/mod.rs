//! 外部传输：HTTP /chat（需 feature `web`）

#[cfg(feature = "web")]
pub mod http;
