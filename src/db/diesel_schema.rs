//! Diesel table definitions for the grid database
//!
//! Kept in sync with the DDL in `schema.rs` by hand; there is no migration
//! framework, just the schema_version table.

diesel::table! {
    grid_cells (cell_id) {
        cell_id -> Text,
        rectangle_id -> Text,
        cell_type -> Text,
        area_size -> Double,
        status -> Text,
        pledge_id -> Nullable<BigInt>,
        payment_id -> Nullable<BigInt>,
        allocation_batch_id -> Nullable<BigInt>,
        donor_name -> Nullable<Text>,
        amount -> Nullable<Double>,
        assigned_date -> Nullable<Text>,
    }
}

diesel::table! {
    allocation_batches (id) {
        id -> BigInt,
        batch_type -> Text,
        approval_status -> Text,
        original_amount -> Double,
        additional_amount -> Double,
        total_amount -> Double,
        allocated_cell_ids -> Text,
        allocated_cell_count -> Integer,
        allocated_area -> Double,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    counters (id) {
        id -> Integer,
        paid_total -> Double,
        pledged_total -> Double,
        grand_total -> Double,
        version -> BigInt,
        recalc_needed -> Integer,
    }
}

diesel::table! {
    audit_logs (id) {
        id -> BigInt,
        user_id -> BigInt,
        entity_type -> Text,
        entity_id -> Text,
        action -> Text,
        before_json -> Nullable<Text>,
        after_json -> Nullable<Text>,
        source -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    pledges (id) {
        id -> BigInt,
        donor_name -> Text,
        amount -> Double,
        donation_type -> Text,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    payments (id) {
        id -> BigInt,
        pledge_id -> Nullable<BigInt>,
        donor_name -> Text,
        amount -> Double,
        status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(grid_cells -> allocation_batches (allocation_batch_id));

diesel::allow_tables_to_appear_in_same_query!(
    grid_cells,
    allocation_batches,
    counters,
    audit_logs,
    pledges,
    payments,
);
