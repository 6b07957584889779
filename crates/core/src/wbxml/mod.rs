//! WBXML codec (C2): translates between the binary wire format legacy
//! clients speak and the [`Element`] tree the SyncML layer understands.
//!
//! The token tables in [`tokens`] are static, per OMA-TS-SyncML_RepPro-V1_2;
//! [`decode`] and [`encode`] are the only entry points other modules need.

pub mod decode;
pub mod element;
pub mod encode;
pub mod tokens;

pub use decode::decode;
pub use element::Element;
pub use encode::encode;
