//! Seed script for the loan-intake service.
//!
//! Populates the record store with a starter hierarchy:
//! - an admin account and a field-agent account,
//! - one demo center with two members (one carrying a pre-filled profile).
//! Run: cargo run --bin seed_data
//! Safe to re-run; existing rows are left alone.

use loan_intake::auth::hash_password;
use loan_intake::error::ApiError;
use loan_intake::storage::Storage;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let data_dir =
        std::env::var("LOAN_INTAKE_DATA_DIR").unwrap_or_else(|_| "loan_data".to_string());
    let storage = Storage::open(&data_dir)?;

    for (name, email, password, admin) in [
        ("Admin", "admin@example.com", "admin", true),
        ("Field Agent", "agent@example.com", "agent", false),
    ] {
        let hash = hash_password(password)?;
        match storage.create_user(name, email, &hash, admin) {
            Ok(user) => println!("created user {} ({})", user.email, user.id),
            Err(ApiError::Conflict(_)) => println!("user {email} already exists, skipping"),
            Err(e) => return Err(e.into()),
        }
    }

    let center = match storage.create_center("Demo Center") {
        Ok(center) => {
            println!("created center {} ({})", center.name, center.id);
            Some(center)
        }
        Err(ApiError::Conflict(_)) => {
            println!("center already exists, skipping members");
            None
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(center) = center {
        storage.create_member(
            &center.id,
            "Lakshmi Devi",
            Some("712".to_string()),
            Some("1988-04-02".to_string()),
            Some("Female".to_string()),
        )?;
        storage.create_member(&center.id, "Meena Kumari", None, None, None)?;
        println!("created 2 demo members under {}", center.name);
    }

    println!("✅ Seed complete ({})", data_dir);
    Ok(())
}
