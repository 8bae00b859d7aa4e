//! Integration tests for the floor grid engine
//!
//! These drive full admin scenarios through the engine layer the way the
//! CLI and admin panel would: approval, undo, manual surgery, failure
//! rollback and counter reconciliation.

use diesel::prelude::*;
use floorgrid::config::RectangleSpec;
use floorgrid::db::donations::{CreatePaymentInput, CreatePledgeInput};
use floorgrid::db::models::{approval_status, batch_types, cell_status, donation_types};
use floorgrid::db::{audit, batches, cells, counters, donations};
use floorgrid::engine::Engine;
use floorgrid::{AdminContext, AllocateCellInput, CellId, Config, GridDb};
use tempfile::TempDir;

/// Helper to open a seeded in-memory grid
fn seeded_grid(rectangle: &str, count: u32) -> (GridDb, Engine, AdminContext) {
    let db = GridDb::open_in_memory().unwrap();
    {
        let mut conn = db.conn().unwrap();
        cells::bulk_seed_cells(
            &mut conn,
            &[RectangleSpec {
                rectangle: rectangle.to_string(),
                cell_type: "0505".to_string(),
                count,
            }],
        )
        .unwrap();
    }
    let engine = Engine::new(db.clone());
    (db, engine, AdminContext::admin_panel(42))
}

fn pending_pledge(db: &GridDb, donation_type: &str, amount: f64) -> i64 {
    let mut conn = db.conn().unwrap();
    donations::create_pledge(
        &mut conn,
        &CreatePledgeInput {
            donor_name: "Jane Doe".to_string(),
            amount,
            donation_type: donation_type.to_string(),
            status: approval_status::PENDING.to_string(),
        },
    )
    .unwrap()
    .id
}

fn pending_payment(db: &GridDb, amount: f64) -> i64 {
    let mut conn = db.conn().unwrap();
    donations::create_payment(
        &mut conn,
        &CreatePaymentInput {
            pledge_id: None,
            donor_name: "John Roe".to_string(),
            amount,
            status: approval_status::PENDING.to_string(),
        },
    )
    .unwrap()
    .id
}

fn cell_ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

/// Manual allocation end to end: assign, verify, deallocate by pledge,
/// repeat deallocation to confirm idempotency.
#[test]
fn test_manual_allocation_and_pledge_deallocation() {
    let (db, engine, ctx) = seeded_grid("B", 20);

    let cell = engine
        .manual
        .allocate_cell(
            &ctx,
            &AllocateCellInput {
                cell_id: "B0505-0010".to_string(),
                donor_name: "Jane Doe".to_string(),
                amount: 100.0,
                status: cell_status::PLEDGED.to_string(),
                pledge_id: Some(77),
                payment_id: None,
            },
        )
        .unwrap();
    assert_eq!(cell.status, cell_status::PLEDGED);
    assert_eq!(cell.donor_name.as_deref(), Some("Jane Doe"));
    assert_eq!(cell.amount, Some(100.0));
    assert_eq!(cell.pledge_id, Some(77));
    assert!(cell.assigned_date.is_some());

    // Manual surgery leaves the ledger flagged for reconciliation
    {
        let mut conn = db.conn().unwrap();
        let snap = counters::get_counters(&mut conn).unwrap().unwrap();
        assert_eq!(snap.recalc_needed, 1);
    }

    let result = engine.deallocation.deallocate_pledge(&ctx, 77).unwrap();
    assert!(result.success);
    assert_eq!(result.deallocated_cells, vec!["B0505-0010".to_string()]);
    assert_eq!(result.deallocated_count, 1);

    {
        let mut conn = db.conn().unwrap();
        let freed = cells::get_cell(&mut conn, "B0505-0010").unwrap().unwrap();
        assert_eq!(freed.status, cell_status::AVAILABLE);
        assert_eq!(freed.pledge_id, None);
        assert_eq!(freed.donor_name, None);
        assert_eq!(freed.assigned_date, None);

        let trail =
            audit::list_for_entity(&mut conn, audit::entities::GRID_CELL, "B0505-0010").unwrap();
        let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![audit::actions::ALLOCATE, audit::actions::DEALLOCATE]
        );
    }

    // Deallocating a pledge with no remaining cells is a successful no-op
    let again = engine.deallocation.deallocate_pledge(&ctx, 77).unwrap();
    assert!(again.success);
    assert_eq!(again.deallocated_count, 0);
}

/// Pledge approval creates a batch over the selection; undo reverts the
/// donation, counters, cells and batch aggregate together.
#[test]
fn test_pledge_approval_and_undo_round_trip() {
    let (db, engine, ctx) = seeded_grid("C", 20);
    let pledge_id = pending_pledge(&db, donation_types::PAID, 400.0);
    let selection = cell_ids(&["C0505-0001", "C0505-0002", "C0505-0003", "C0505-0004"]);

    let assigned = engine.workflows.approve_pledge(&ctx, pledge_id, &selection).unwrap();
    assert_eq!(assigned.len(), 4);
    let batch_id = assigned[0].allocation_batch_id.expect("multi-cell approval creates a batch");

    {
        let mut conn = db.conn().unwrap();
        let batch = batches::get_batch(&mut conn, batch_id).unwrap();
        assert_eq!(batch.batch_type, batch_types::PLEDGE_UPDATE);
        assert_eq!(batch.approval_status, approval_status::APPROVED);
        assert_eq!(batch.allocated_cell_count, 4);
        assert_eq!(batch.allocated_area, 1.0);

        let snap = counters::get_counters(&mut conn).unwrap().unwrap();
        assert_eq!(snap.paid_total, 400.0);
        assert_eq!(snap.grand_total, 400.0);
        assert_eq!(snap.recalc_needed, 0);
    }

    let result = engine.workflows.undo_pledge_approval(&ctx, pledge_id).unwrap();
    assert!(result.success);
    assert_eq!(result.deallocated_cells, selection);

    let mut conn = db.conn().unwrap();
    let snap = counters::get_counters(&mut conn).unwrap().unwrap();
    assert_eq!(snap.paid_total, 0.0);
    assert_eq!(snap.grand_total, 0.0);

    let pledge = donations::require_pledge(&mut conn, pledge_id).unwrap();
    assert_eq!(pledge.status, approval_status::PENDING);

    for cell_id in &selection {
        let cell = cells::get_cell(&mut conn, cell_id).unwrap().unwrap();
        assert_eq!(cell.status, cell_status::AVAILABLE);
        assert_eq!(cell.allocation_batch_id, None);
    }

    // The batch row survives empty; no record is deleted
    let batch = batches::get_batch(&mut conn, batch_id).unwrap();
    assert_eq!(batch.allocated_cell_count, 0);
    assert_eq!(batch.allocated_area, 0.0);
    assert_eq!(batch.allocated_cell_ids, "[]");
}

/// A failing deallocation must roll back the donation status flip and leave
/// no partial state behind.
#[test]
fn test_failed_undo_rolls_back_everything() {
    let (db, engine, ctx) = seeded_grid("D", 20);
    let pledge_id = pending_pledge(&db, donation_types::PAID, 90.0);
    let assigned = engine
        .workflows
        .approve_pledge(&ctx, pledge_id, &cell_ids(&["D0505-0001", "D0505-0002"]))
        .unwrap();
    let batch_id = assigned[0].allocation_batch_id.unwrap();

    // Corrupt the batch's cell id list so the shrink step cannot parse it
    {
        use floorgrid::db::diesel_schema::allocation_batches;
        let mut conn = db.conn().unwrap();
        diesel::update(allocation_batches::table.filter(allocation_batches::id.eq(batch_id)))
            .set(allocation_batches::allocated_cell_ids.eq("corrupted"))
            .execute(&mut conn)
            .unwrap();
    }

    let audit_entries_before = db.stats().unwrap().audit_entries;

    let result = engine.workflows.undo_pledge_approval(&ctx, pledge_id).unwrap();
    assert!(!result.success);
    assert_eq!(result.deallocated_count, 0);
    assert!(result.error.as_deref().unwrap().contains("Floor deallocation failed"));

    // Donation flip, counters and cells all rolled back
    let mut conn = db.conn().unwrap();
    let pledge = donations::require_pledge(&mut conn, pledge_id).unwrap();
    assert_eq!(pledge.status, approval_status::APPROVED);

    let snap = counters::get_counters(&mut conn).unwrap().unwrap();
    assert_eq!(snap.paid_total, 90.0);

    let cell = cells::get_cell(&mut conn, "D0505-0001").unwrap().unwrap();
    assert_eq!(cell.status, cell_status::PAID);
    drop(conn);

    assert_eq!(db.stats().unwrap().audit_entries, audit_entries_before);
}

/// Approving a selection containing an occupied cell fails whole, leaving
/// the second donation pending and its untouched cells available.
#[test]
fn test_overlapping_approval_rolls_back() {
    let (db, engine, ctx) = seeded_grid("E", 20);
    let first = pending_pledge(&db, donation_types::PAID, 100.0);
    let second = pending_pledge(&db, donation_types::PAID, 60.0);

    engine
        .workflows
        .approve_pledge(&ctx, first, &cell_ids(&["E0505-0001", "E0505-0002"]))
        .unwrap();

    let err = engine
        .workflows
        .approve_pledge(&ctx, second, &cell_ids(&["E0505-0002", "E0505-0003"]))
        .unwrap_err();
    assert!(matches!(err, floorgrid::GridError::CellNotAvailable(_)));

    let mut conn = db.conn().unwrap();
    let pledge = donations::require_pledge(&mut conn, second).unwrap();
    assert_eq!(pledge.status, approval_status::PENDING);

    let untouched = cells::get_cell(&mut conn, "E0505-0003").unwrap().unwrap();
    assert_eq!(untouched.status, cell_status::AVAILABLE);

    let snap = counters::get_counters(&mut conn).unwrap().unwrap();
    assert_eq!(snap.paid_total, 100.0);
}

/// Batches built from atomic cells keep a uniform per-cell area through
/// repeated shrinks.
#[test]
fn test_batch_area_stays_uniform_under_shrink() {
    let (db, engine, ctx) = seeded_grid("F", 20);
    let pledge_id = pending_pledge(&db, donation_types::PLEDGED, 200.0);
    let selection = cell_ids(&["F0505-0001", "F0505-0002", "F0505-0003", "F0505-0004"]);
    let assigned = engine.workflows.approve_pledge(&ctx, pledge_id, &selection).unwrap();
    let batch_id = assigned[0].allocation_batch_id.unwrap();

    let atomic_area = CellId::parse("F0505-0001").unwrap().area();
    assert_eq!(atomic_area, 0.25);

    for (step, cell_id) in ["F0505-0004", "F0505-0001", "F0505-0003"].iter().enumerate() {
        engine.manual.unallocate_cell(&ctx, cell_id).unwrap();

        let mut conn = db.conn().unwrap();
        let batch = batches::get_batch(&mut conn, batch_id).unwrap();
        let expected_count = 3 - step as i32;
        assert_eq!(batch.allocated_cell_count, expected_count);
        assert_eq!(batch.allocated_area, expected_count as f64 * atomic_area);
    }
}

/// Reconciliation rebuilds the counters from the donation tables after
/// out-of-band changes the delta path never saw.
#[test]
fn test_reconcile_after_out_of_band_approval() {
    let (db, engine, ctx) = seeded_grid("G", 20);

    // A pledge inserted already approved: no delta was ever applied
    {
        let mut conn = db.conn().unwrap();
        donations::create_pledge(
            &mut conn,
            &CreatePledgeInput {
                donor_name: "Imported Donor".to_string(),
                amount: 300.0,
                donation_type: donation_types::PAID.to_string(),
                status: approval_status::APPROVED.to_string(),
            },
        )
        .unwrap();
    }

    // Plus one normally approved payment
    let payment_id = pending_payment(&db, 50.0);
    engine
        .workflows
        .approve_payment(&ctx, payment_id, &cell_ids(&["G0505-0001"]))
        .unwrap();

    // Manual surgery flags the ledger
    engine
        .manual
        .allocate_cell(
            &ctx,
            &AllocateCellInput {
                cell_id: "G0505-0002".to_string(),
                donor_name: "Imported Donor".to_string(),
                amount: 300.0,
                status: cell_status::PAID.to_string(),
                pledge_id: Some(1),
                payment_id: None,
            },
        )
        .unwrap();

    let report = engine.reconciler.reconcile(&ctx).unwrap();
    assert_eq!(report.current.paid_total, 350.0);
    assert_eq!(report.current.pledged_total, 0.0);
    assert_eq!(report.current.grand_total, 350.0);
    assert_eq!(report.current.recalc_needed, 0);
    // The stored ledger only knew about the 50.0 payment
    assert_eq!(report.paid_drift, 300.0);
    assert!(!report.in_sync());

    // A second pass finds nothing to repair
    let second = engine.reconciler.reconcile(&ctx).unwrap();
    assert!(second.in_sync());
}

/// Counter conservation: a full approve/edit/undo cycle across both donation
/// kinds returns every bucket to zero while the version only climbs.
#[test]
fn test_counter_conservation_over_mixed_workflows() {
    let (db, engine, ctx) = seeded_grid("A", 20);
    let pledge_id = pending_pledge(&db, donation_types::PLEDGED, 500.0);
    let payment_id = pending_payment(&db, 200.0);

    let mut versions = Vec::new();
    let mut record_version = |db: &GridDb| {
        let mut conn = db.conn().unwrap();
        versions.push(counters::get_counters(&mut conn).unwrap().unwrap().version);
    };

    engine
        .workflows
        .approve_pledge(&ctx, pledge_id, &cell_ids(&["A0505-0001", "A0505-0002"]))
        .unwrap();
    record_version(&db);

    engine
        .workflows
        .approve_payment(&ctx, payment_id, &cell_ids(&["A0505-0003"]))
        .unwrap();
    record_version(&db);

    engine
        .workflows
        .edit_approved_amount(&ctx, floorgrid::engine::DonationKind::Pledge, pledge_id, 650.0)
        .unwrap();
    record_version(&db);

    assert!(engine.workflows.undo_payment_approval(&ctx, payment_id).unwrap().success);
    record_version(&db);

    assert!(engine.workflows.undo_pledge_approval(&ctx, pledge_id).unwrap().success);
    record_version(&db);

    let mut conn = db.conn().unwrap();
    let snap = counters::get_counters(&mut conn).unwrap().unwrap();
    assert_eq!(snap.paid_total, 0.0);
    assert_eq!(snap.pledged_total, 0.0);
    assert_eq!(snap.grand_total, 0.0);

    assert!(versions.windows(2).all(|w| w[0] < w[1]));
}

/// The on-disk path: open, seed, work, reopen. Schema setup must be
/// idempotent and state must survive the reopen.
#[test]
fn test_on_disk_database_reopen() {
    let temp = TempDir::new().unwrap();
    let config = Config {
        data_dir: temp.path().to_path_buf(),
        ..Config::default()
    };
    let db_path = config.db_path();

    {
        let db = GridDb::open(&db_path, config.busy_timeout_ms).unwrap();
        let mut conn = db.conn().unwrap();
        let report = cells::bulk_seed_cells(
            &mut conn,
            &[RectangleSpec {
                rectangle: "A".to_string(),
                cell_type: "0505".to_string(),
                count: 8,
            }],
        )
        .unwrap();
        assert_eq!(report.inserted, 8);
        assert_eq!(report.skipped, 0);
        drop(conn);

        let engine = Engine::new(db.clone());
        let ctx = AdminContext::cli(1);
        let pledge_id = pending_pledge(&db, donation_types::PAID, 75.0);
        engine
            .workflows
            .approve_pledge(&ctx, pledge_id, &cell_ids(&["A0505-0005"]))
            .unwrap();
    }

    // Reopen: schema init sees the current version and reseeding skips
    let db = GridDb::open(&db_path, config.busy_timeout_ms).unwrap();
    let mut conn = db.conn().unwrap();
    let report = cells::bulk_seed_cells(
        &mut conn,
        &[RectangleSpec {
            rectangle: "A".to_string(),
            cell_type: "0505".to_string(),
            count: 8,
        }],
    )
    .unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.skipped, 8);

    let cell = cells::get_cell(&mut conn, "A0505-0005").unwrap().unwrap();
    assert_eq!(cell.status, cell_status::PAID);

    let snap = counters::get_counters(&mut conn).unwrap().unwrap();
    assert_eq!(snap.paid_total, 75.0);

    let stats = db.stats().unwrap();
    assert_eq!(stats.total_cells, 8);
    assert_eq!(stats.paid_cells, 1);
    assert_eq!(stats.available_cells, 7);
}
