pub mod models;

pub use models::{NewPartner, Partner, PartnerDirection, PartnerIds, PartnerUpdate, UserSnapshot};
