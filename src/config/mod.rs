// src/config/mod.rs
pub mod regions;
pub mod settings;

pub use regions::{RegionDef, RegionRegistry};
pub use settings::{MailTransport, Settings};
