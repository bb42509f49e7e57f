//! # Seed Data Generator
//!
//! Populates a development database with a small formulary, a realistic
//! batch ledger and a few prescriptions waiting at the pharmacy.
//!
//! ## Usage
//! ```bash
//! cargo run -p dispensary-db --bin seed
//!
//! # Specify database path
//! cargo run -p dispensary-db --bin seed -- --db ./data/dispensary.db
//! ```
//!
//! ## Generated Ledger
//! Dates are relative to the day the seeder runs, so the shelf always has:
//! - a lot past its expiry date (never offered)
//! - a disposed lot (never offered)
//! - an empty lot (hidden from availability)
//! - lots expiring soon and lots expiring late, to show FIFO order
//!
//! One prescription asks for more Amoxicillin than is on the shelf, to
//! exercise the partial-fulfillment path.

use chrono::{Days, NaiveDate, Utc};
use std::env;
use uuid::Uuid;

use dispensary_core::{
    Batch, BatchStatus, Medicine, Prescription, PrescriptionLine, PrescriptionStatus,
};
use dispensary_db::{Database, DbConfig};

/// (name, unit, unit price in cents, supplier)
const MEDICINES: &[(&str, &str, i64, &str)] = &[
    ("Paracetamol 500mg", "tablet", 150, "Hanoi Pharma"),
    ("Amoxicillin 250mg", "capsule", 400, "Mekong Labs"),
    ("Omeprazole 20mg", "capsule", 275, "Hanoi Pharma"),
];

/// (medicine index, batch number, quantity, imported days ago, expiry offset
/// in days from today (negative = already past), status)
const BATCHES: &[(usize, &str, i64, u64, i64, BatchStatus)] = &[
    (0, "PCM-2401", 20, 300, 30, BatchStatus::Active),
    (0, "PCM-2405", 50, 180, 240, BatchStatus::Active),
    (0, "PCM-2311", 40, 420, -15, BatchStatus::Active),
    (1, "AMX-2402", 30, 250, 60, BatchStatus::Active),
    (1, "AMX-2404", 0, 200, 120, BatchStatus::Active),
    (1, "AMX-2312", 25, 400, 90, BatchStatus::Disposed),
    (2, "OMP-2403", 100, 220, 400, BatchStatus::Active),
    (2, "OMP-2310", 60, 440, 10, BatchStatus::Expired),
];

/// (medicine index, quantity) per line, one prescription per entry
const PRESCRIPTIONS: &[&[(usize, i64)]] = &[
    &[(0, 30)],
    &[(0, 10), (2, 14)],
    &[(1, 40)],
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = "./dispensary_dev.db".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Dispensary Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./dispensary_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Dispensary Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.medicines().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} medicines", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let now = Utc::now();

    // Formulary
    let mut medicines = Vec::with_capacity(MEDICINES.len());
    for (name, unit, price, supplier) in MEDICINES {
        let medicine = Medicine {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            unit_price_cents: *price,
            supplier: Some(supplier.to_string()),
            created_at: now,
        };
        db.medicines().insert(&medicine).await?;
        medicines.push(medicine);
    }
    println!("✓ {} medicines", medicines.len());

    // Batch ledger
    for (medicine_idx, number, quantity, imported_ago, expiry_offset, status) in BATCHES {
        let import_date = today - Days::new(*imported_ago);
        let expiry_date = offset(today, *expiry_offset);

        let mut batch = Batch::new(
            Uuid::new_v4().to_string(),
            medicines[*medicine_idx].id.as_str(),
            *number,
            *quantity,
            import_date,
            expiry_date,
        );
        batch.status = *status;

        db.batches().insert(&batch).await?;
        println!(
            "  {:<10} {:>4} units  expires {}  ({})",
            batch.batch_number, batch.quantity_remaining, batch.expiry_date, batch.status
        );
    }
    println!("✓ {} batches", BATCHES.len());

    // Prescriptions waiting at the counter
    for lines in PRESCRIPTIONS {
        let prescription = Prescription {
            id: Uuid::new_v4().to_string(),
            appointment_id: Uuid::new_v4().to_string(),
            status: PrescriptionStatus::PendingPrepare,
            note: None,
            use_hospital_pharmacy: true,
            status_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let rows: Vec<PrescriptionLine> = lines
            .iter()
            .map(|(medicine_idx, quantity)| PrescriptionLine {
                id: Uuid::new_v4().to_string(),
                prescription_id: prescription.id.clone(),
                medicine_id: medicines[*medicine_idx].id.clone(),
                quantity_prescribed: *quantity,
                dosage: Some("1 unit".to_string()),
                frequency: Some("3 times daily".to_string()),
                duration: Some("7 days".to_string()),
                instructions: Some("After meals".to_string()),
            })
            .collect();

        db.prescriptions().insert(&prescription, &rows).await?;
        println!("  prescription {} ({} lines)", prescription.id, rows.len());
    }
    println!("✓ {} prescriptions pending", PRESCRIPTIONS.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn offset(today: NaiveDate, days: i64) -> NaiveDate {
    if days >= 0 {
        today + Days::new(days.unsigned_abs())
    } else {
        today - Days::new(days.unsigned_abs())
    }
}
