//! SyncML message model, parser (C4), and builder (C5).

pub mod builder;
pub mod model;
pub mod parser;

pub use builder::{ItemSpec, ResponseBuilder};
pub use model::{CommandKind, Cred, Meta, MetaKey, SyncMLCommand, SyncMLHeader, SyncMLItem, SyncMLMessage};
pub use parser::parse;
