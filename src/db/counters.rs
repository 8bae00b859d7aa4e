//! Campaign counter operations
//!
//! The counters table holds one row of running totals (paid, pledged,
//! grand). Every write is a single atomic upsert so that two concurrent
//! approvals can never lose a delta to each other; application code never
//! reads the totals and writes them back.
//!
//! `recalc_needed` is the escape hatch for write paths that cannot prove
//! their delta (manual cell surgery); the reconciliation pass consumes it.

use diesel::prelude::*;

use super::diesel_schema::counters;
use super::models::CounterSnapshot;
use crate::error::GridError;

/// Fixed id of the singleton counters row
pub const COUNTERS_ROW_ID: i32 = 1;

/// Read the current totals, if the row exists yet
pub fn get_counters(conn: &mut SqliteConnection) -> Result<Option<CounterSnapshot>, GridError> {
    counters::table
        .filter(counters::id.eq(COUNTERS_ROW_ID))
        .first(conn)
        .optional()
        .map_err(|e| GridError::Internal(format!("Counter query failed: {}", e)))
}

/// Apply a signed delta to the running totals.
///
/// Inserts the singleton with the delta as initial value, or adds the delta
/// to each bucket and `paid + pledged` to the grand total. Bumps `version`
/// and clears `recalc_needed` in the same statement.
pub fn apply_delta(
    conn: &mut SqliteConnection,
    paid_delta: f64,
    pledged_delta: f64,
) -> Result<CounterSnapshot, GridError> {
    let grand_delta = paid_delta + pledged_delta;

    diesel::insert_into(counters::table)
        .values((
            counters::id.eq(COUNTERS_ROW_ID),
            counters::paid_total.eq(paid_delta),
            counters::pledged_total.eq(pledged_delta),
            counters::grand_total.eq(grand_delta),
            counters::version.eq(1i64),
            counters::recalc_needed.eq(0),
        ))
        .on_conflict(counters::id)
        .do_update()
        .set((
            counters::paid_total.eq(counters::paid_total + paid_delta),
            counters::pledged_total.eq(counters::pledged_total + pledged_delta),
            counters::grand_total.eq(counters::grand_total + grand_delta),
            counters::version.eq(counters::version + 1i64),
            counters::recalc_needed.eq(0),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Counter upsert failed: {}", e)))?;

    get_counters(conn)?
        .ok_or_else(|| GridError::Internal("Counters row missing after upsert".to_string()))
}

/// Flag the totals as untrusted.
///
/// Set by write paths that bypass the donation workflow and therefore have
/// no provable delta. Bumps `version`; cleared by `apply_delta` or the
/// reconciliation pass.
pub fn mark_recalc_needed(conn: &mut SqliteConnection) -> Result<CounterSnapshot, GridError> {
    diesel::insert_into(counters::table)
        .values((
            counters::id.eq(COUNTERS_ROW_ID),
            counters::paid_total.eq(0.0),
            counters::pledged_total.eq(0.0),
            counters::grand_total.eq(0.0),
            counters::version.eq(1i64),
            counters::recalc_needed.eq(1),
        ))
        .on_conflict(counters::id)
        .do_update()
        .set((
            counters::recalc_needed.eq(1),
            counters::version.eq(counters::version + 1i64),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Counter upsert failed: {}", e)))?;

    get_counters(conn)?
        .ok_or_else(|| GridError::Internal("Counters row missing after upsert".to_string()))
}

/// Replace the totals with authoritative recomputed values.
///
/// Used only by the reconciliation pass; bumps `version` and clears
/// `recalc_needed`.
pub fn overwrite_totals(
    conn: &mut SqliteConnection,
    paid_total: f64,
    pledged_total: f64,
) -> Result<CounterSnapshot, GridError> {
    let grand_total = paid_total + pledged_total;

    diesel::insert_into(counters::table)
        .values((
            counters::id.eq(COUNTERS_ROW_ID),
            counters::paid_total.eq(paid_total),
            counters::pledged_total.eq(pledged_total),
            counters::grand_total.eq(grand_total),
            counters::version.eq(1i64),
            counters::recalc_needed.eq(0),
        ))
        .on_conflict(counters::id)
        .do_update()
        .set((
            counters::paid_total.eq(paid_total),
            counters::pledged_total.eq(pledged_total),
            counters::grand_total.eq(grand_total),
            counters::version.eq(counters::version + 1i64),
            counters::recalc_needed.eq(0),
        ))
        .execute(conn)
        .map_err(|e| GridError::Internal(format!("Counter upsert failed: {}", e)))?;

    get_counters(conn)?
        .ok_or_else(|| GridError::Internal("Counters row missing after upsert".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use diesel::sqlite::SqliteConnection;
    use diesel::Connection;

    fn setup_test_db() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:")
            .expect("Failed to create in-memory database");
        schema::init_schema(&mut conn).expect("Failed to initialize schema");
        conn
    }

    #[test]
    fn test_first_delta_initializes_singleton() {
        let mut conn = setup_test_db();
        assert!(get_counters(&mut conn).unwrap().is_none());

        let snap = apply_delta(&mut conn, 500.0, 250.0).unwrap();
        assert_eq!(snap.id, COUNTERS_ROW_ID);
        assert_eq!(snap.paid_total, 500.0);
        assert_eq!(snap.pledged_total, 250.0);
        assert_eq!(snap.grand_total, 750.0);
        assert_eq!(snap.version, 1);
        assert_eq!(snap.recalc_needed, 0);
    }

    #[test]
    fn test_deltas_accumulate_and_bump_version() {
        let mut conn = setup_test_db();
        apply_delta(&mut conn, 100.0, 0.0).unwrap();
        let snap = apply_delta(&mut conn, 50.0, 200.0).unwrap();

        assert_eq!(snap.paid_total, 150.0);
        assert_eq!(snap.pledged_total, 200.0);
        assert_eq!(snap.grand_total, 350.0);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn test_negative_delta_reverses_a_positive_one() {
        let mut conn = setup_test_db();
        apply_delta(&mut conn, 500.0, 0.0).unwrap();
        let snap = apply_delta(&mut conn, -500.0, 0.0).unwrap();

        assert_eq!(snap.paid_total, 0.0);
        assert_eq!(snap.grand_total, 0.0);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn test_mark_recalc_needed_and_clearing() {
        let mut conn = setup_test_db();

        // Flag can be raised before any delta ever ran
        let snap = mark_recalc_needed(&mut conn).unwrap();
        assert_eq!(snap.recalc_needed, 1);
        assert_eq!(snap.grand_total, 0.0);
        assert_eq!(snap.version, 1);

        // A trusted delta clears it
        let snap = apply_delta(&mut conn, 10.0, 0.0).unwrap();
        assert_eq!(snap.recalc_needed, 0);
        assert_eq!(snap.version, 2);

        let snap = mark_recalc_needed(&mut conn).unwrap();
        assert_eq!(snap.recalc_needed, 1);
        assert_eq!(snap.paid_total, 10.0, "marking must not touch totals");
        assert_eq!(snap.version, 3);
    }

    #[test]
    fn test_overwrite_totals() {
        let mut conn = setup_test_db();
        apply_delta(&mut conn, 999.0, 999.0).unwrap();
        mark_recalc_needed(&mut conn).unwrap();

        let snap = overwrite_totals(&mut conn, 120.0, 80.0).unwrap();
        assert_eq!(snap.paid_total, 120.0);
        assert_eq!(snap.pledged_total, 80.0);
        assert_eq!(snap.grand_total, 200.0);
        assert_eq!(snap.recalc_needed, 0);
        assert_eq!(snap.version, 3);
    }
}
