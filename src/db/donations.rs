//! Pledge and payment row operations
//!
//! The donation CRUD surface proper (admin forms, donor management) lives
//! outside this crate; these are the minimal rows the undo/edit workflows
//! flip inside their transactions and the reconciliation pass sums.

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::{payments, pledges};
use super::last_insert_rowid;
use super::models::{
    approval_status, current_timestamp, donation_types, NewPayment, NewPledge, Payment, Pledge,
};
use crate::error::GridError;

// ============================================================================
// Query Types
// ============================================================================

/// Input for creating a pledge
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePledgeInput {
    pub donor_name: String,
    pub amount: f64,
    #[serde(default = "default_donation_type")]
    pub donation_type: String,
    #[serde(default = "default_status")]
    pub status: String,
}

/// Input for creating a payment
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentInput {
    #[serde(default)]
    pub pledge_id: Option<i64>,
    pub donor_name: String,
    pub amount: f64,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_donation_type() -> String {
    donation_types::PLEDGED.to_string()
}

fn default_status() -> String {
    approval_status::PENDING.to_string()
}

// ============================================================================
// Pledges
// ============================================================================

/// Get a pledge by id
pub fn get_pledge(conn: &mut SqliteConnection, pledge_id: i64) -> Result<Option<Pledge>, GridError> {
    pledges::table
        .filter(pledges::id.eq(pledge_id))
        .first(conn)
        .optional()
        .map_err(|e| GridError::Internal(format!("Pledge query failed: {}", e)))
}

/// Get a pledge by id, failing if it does not exist
pub fn require_pledge(conn: &mut SqliteConnection, pledge_id: i64) -> Result<Pledge, GridError> {
    get_pledge(conn, pledge_id)?.ok_or(GridError::DonationNotFound {
        kind: "Pledge",
        id: pledge_id,
    })
}

/// Create a pledge
pub fn create_pledge(
    conn: &mut SqliteConnection,
    input: &CreatePledgeInput,
) -> Result<Pledge, GridError> {
    if !donation_types::is_valid(&input.donation_type) {
        return Err(GridError::InvalidInput(format!(
            "Invalid donation type: {}",
            input.donation_type
        )));
    }
    if !approval_status::is_valid(&input.status) {
        return Err(GridError::InvalidInput(format!(
            "Invalid pledge status: {}",
            input.status
        )));
    }

    let new_pledge = NewPledge {
        donor_name: &input.donor_name,
        amount: input.amount,
        donation_type: &input.donation_type,
        status: &input.status,
    };

    diesel::insert_into(pledges::table)
        .values(&new_pledge)
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Pledge insert failed: {}", e)))?;

    let pledge_id: i64 = diesel::select(last_insert_rowid())
        .get_result(conn)
        .map_err(|e| GridError::Internal(format!("Pledge id fetch failed: {}", e)))?;

    require_pledge(conn, pledge_id)
}

/// Flip a pledge's approval status
pub fn set_pledge_status(
    conn: &mut SqliteConnection,
    pledge_id: i64,
    status: &str,
) -> Result<Pledge, GridError> {
    if !approval_status::is_valid(status) {
        return Err(GridError::InvalidInput(format!(
            "Invalid pledge status: {}",
            status
        )));
    }

    let updated = diesel::update(pledges::table.filter(pledges::id.eq(pledge_id)))
        .set((
            pledges::status.eq(status),
            pledges::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Pledge update failed: {}", e)))?;

    if updated == 0 {
        return Err(GridError::DonationNotFound {
            kind: "Pledge",
            id: pledge_id,
        });
    }

    require_pledge(conn, pledge_id)
}

/// Set a pledge's amount
pub fn set_pledge_amount(
    conn: &mut SqliteConnection,
    pledge_id: i64,
    amount: f64,
) -> Result<Pledge, GridError> {
    let updated = diesel::update(pledges::table.filter(pledges::id.eq(pledge_id)))
        .set((
            pledges::amount.eq(amount),
            pledges::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Pledge update failed: {}", e)))?;

    if updated == 0 {
        return Err(GridError::DonationNotFound {
            kind: "Pledge",
            id: pledge_id,
        });
    }

    require_pledge(conn, pledge_id)
}

// ============================================================================
// Payments
// ============================================================================

/// Get a payment by id
pub fn get_payment(
    conn: &mut SqliteConnection,
    payment_id: i64,
) -> Result<Option<Payment>, GridError> {
    payments::table
        .filter(payments::id.eq(payment_id))
        .first(conn)
        .optional()
        .map_err(|e| GridError::Internal(format!("Payment query failed: {}", e)))
}

/// Get a payment by id, failing if it does not exist
pub fn require_payment(conn: &mut SqliteConnection, payment_id: i64) -> Result<Payment, GridError> {
    get_payment(conn, payment_id)?.ok_or(GridError::DonationNotFound {
        kind: "Payment",
        id: payment_id,
    })
}

/// Create a payment
pub fn create_payment(
    conn: &mut SqliteConnection,
    input: &CreatePaymentInput,
) -> Result<Payment, GridError> {
    if !approval_status::is_valid(&input.status) {
        return Err(GridError::InvalidInput(format!(
            "Invalid payment status: {}",
            input.status
        )));
    }

    let new_payment = NewPayment {
        pledge_id: input.pledge_id,
        donor_name: &input.donor_name,
        amount: input.amount,
        status: &input.status,
    };

    diesel::insert_into(payments::table)
        .values(&new_payment)
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Payment insert failed: {}", e)))?;

    let payment_id: i64 = diesel::select(last_insert_rowid())
        .get_result(conn)
        .map_err(|e| GridError::Internal(format!("Payment id fetch failed: {}", e)))?;

    require_payment(conn, payment_id)
}

/// Flip a payment's approval status
pub fn set_payment_status(
    conn: &mut SqliteConnection,
    payment_id: i64,
    status: &str,
) -> Result<Payment, GridError> {
    if !approval_status::is_valid(status) {
        return Err(GridError::InvalidInput(format!(
            "Invalid payment status: {}",
            status
        )));
    }

    let updated = diesel::update(payments::table.filter(payments::id.eq(payment_id)))
        .set((
            payments::status.eq(status),
            payments::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Payment update failed: {}", e)))?;

    if updated == 0 {
        return Err(GridError::DonationNotFound {
            kind: "Payment",
            id: payment_id,
        });
    }

    require_payment(conn, payment_id)
}

/// Set a payment's amount
pub fn set_payment_amount(
    conn: &mut SqliteConnection,
    payment_id: i64,
    amount: f64,
) -> Result<Payment, GridError> {
    let updated = diesel::update(payments::table.filter(payments::id.eq(payment_id)))
        .set((
            payments::amount.eq(amount),
            payments::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Payment update failed: {}", e)))?;

    if updated == 0 {
        return Err(GridError::DonationNotFound {
            kind: "Payment",
            id: payment_id,
        });
    }

    require_payment(conn, payment_id)
}

// ============================================================================
// Reconciliation Sums
// ============================================================================

/// Authoritative paid total: approved paid-type pledges plus approved payments
pub fn sum_approved_paid(conn: &mut SqliteConnection) -> Result<f64, GridError> {
    let pledge_sum: Option<f64> = pledges::table
        .filter(pledges::status.eq(approval_status::APPROVED))
        .filter(pledges::donation_type.eq(donation_types::PAID))
        .select(diesel::dsl::sum(pledges::amount))
        .first(conn)
        .map_err(|e| GridError::Internal(format!("Pledge sum query failed: {}", e)))?;

    let payment_sum: Option<f64> = payments::table
        .filter(payments::status.eq(approval_status::APPROVED))
        .select(diesel::dsl::sum(payments::amount))
        .first(conn)
        .map_err(|e| GridError::Internal(format!("Payment sum query failed: {}", e)))?;

    Ok(pledge_sum.unwrap_or(0.0) + payment_sum.unwrap_or(0.0))
}

/// Authoritative pledged total: approved pledged-type pledges
pub fn sum_approved_pledged(conn: &mut SqliteConnection) -> Result<f64, GridError> {
    let pledge_sum: Option<f64> = pledges::table
        .filter(pledges::status.eq(approval_status::APPROVED))
        .filter(pledges::donation_type.eq(donation_types::PLEDGED))
        .select(diesel::dsl::sum(pledges::amount))
        .first(conn)
        .map_err(|e| GridError::Internal(format!("Pledge sum query failed: {}", e)))?;

    Ok(pledge_sum.unwrap_or(0.0))
}
