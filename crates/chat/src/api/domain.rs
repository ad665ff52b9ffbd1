//! Domain ownership claims

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::error::NotFoundError;
use crate::gateway::{Query, RowGateway, Table, from_row, select_optional, to_row};
use crate::models::{DomainVerification, UserId};
use crate::widget::validate_domain_name;

#[derive(Serialize)]
struct NewDomainVerification<'a> {
    user_id: &'a str,
    domain: &'a str,
    verification_token: String,
}

/// Look up the verification record for one of the user's domains
pub fn verify_domain(
    gateway: &dyn RowGateway,
    user_id: &UserId,
    domain: &str,
) -> Result<DomainVerification> {
    select_optional(
        gateway,
        &Query::table(Table::DomainVerifications)
            .eq("user_id", user_id.as_str())
            .eq("domain", domain),
    )?
    .ok_or_else(|| {
        NotFoundError {
            resource: format!("domain verification for {}", domain),
        }
        .into()
    })
}

/// Claim a domain for the user, leaving it pending verification
pub fn register_domain(
    gateway: &dyn RowGateway,
    user_id: &UserId,
    domain: &str,
) -> Result<DomainVerification> {
    let domain = validate_domain_name(domain)?;
    let claim = NewDomainVerification {
        user_id: user_id.as_str(),
        domain: &domain,
        verification_token: uuid::Uuid::new_v4().simple().to_string(),
    };
    let row = gateway.insert(Table::DomainVerifications, to_row(&claim)?)?;
    let verification: DomainVerification = from_row(Table::DomainVerifications, row)?;
    info!("Registered domain {} for {}", verification.domain, user_id.as_str());
    Ok(verification)
}
