//! Core traits for speedns
//!
//! - [`ZoneApi`]: list/create/delete records on the DNS hosting provider
//! - [`ZoneApiFactory`]: build a [`ZoneApi`] from configured credentials

pub mod zone_api;

pub use zone_api::{DnsRecord, NewRecord, RECORD_TTL, RecordType, ZoneApi, ZoneApiFactory};
