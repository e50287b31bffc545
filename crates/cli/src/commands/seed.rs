use rust_decimal::Decimal;

use rfpdesk_core::domain::vendor::{VendorAttributes, VendorContact, VendorId, VendorProfile};
use rfpdesk_db::repositories::SqlVendorDirectory;

use crate::commands::runtime::{execute, migrated_pool};
use crate::commands::{CommandResult, Failure, EXIT_ACTION};

/// Upserts the demo vendor directory. Safe to run repeatedly.
pub fn run() -> CommandResult {
    execute("seed", |config| async move {
        let pool = migrated_pool(&config).await?;
        let directory = SqlVendorDirectory::new(pool.clone());
        let vendors = demo_vendors();

        let mut outcome = Ok(());
        for vendor in &vendors {
            if let Err(error) = directory.upsert(vendor).await {
                outcome = Err(("seed_execution", error.to_string(), EXIT_ACTION));
                break;
            }
        }
        if outcome.is_ok() {
            outcome = verify(&directory, &vendors).await;
        }
        pool.close().await;
        outcome?;

        let lines = vendors
            .iter()
            .map(|vendor| {
                format!(
                    "  - {}: {} <{}> rating {} on-time {}%",
                    vendor.id,
                    vendor.contact.name,
                    vendor.contact.email,
                    vendor.attributes.overall_rating,
                    vendor.attributes.on_time_delivery_rate
                )
            })
            .collect::<Vec<_>>();
        Ok(format!("demo vendor directory seeded with {} vendors:\n{}", vendors.len(), lines.join("\n")))
    })
}

async fn verify(
    directory: &SqlVendorDirectory,
    vendors: &[VendorProfile],
) -> Result<(), Failure> {
    let mut missing = Vec::new();
    for vendor in vendors {
        match directory.find(vendor.id).await {
            Ok(Some(stored)) if &stored == vendor => {}
            Ok(_) => missing.push(vendor.id.to_string()),
            Err(error) => return Err(("seed_verification", error.to_string(), EXIT_ACTION)),
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err((
            "seed_verification",
            format!("seed verification failed for vendors: {}", missing.join(", ")),
            EXIT_ACTION,
        ))
    }
}

pub fn demo_vendors() -> Vec<VendorProfile> {
    let vendor = |id: i64, name: &str, slug: &str, rating: i64, on_time: i64, verified: [bool; 3]| {
        VendorProfile {
            id: VendorId(id),
            contact: VendorContact {
                name: name.to_string(),
                email: format!("sales@{slug}.example"),
                phone: Some(format!("+1-555-010{id}")),
                company: Some(name.to_string()),
                address: None,
            },
            attributes: VendorAttributes {
                email_verified: verified[0],
                phone_verified: verified[1],
                business_verified: verified[2],
                overall_rating: Decimal::new(rating, 1),
                on_time_delivery_rate: Decimal::new(on_time, 0),
            },
        }
    };

    vec![
        vendor(1, "Northwind Office Supply", "northwind", 46, 97, [true, true, true]),
        vendor(2, "Contoso Furnishings", "contoso", 42, 91, [true, true, false]),
        vendor(3, "Fabrikam Industrial", "fabrikam", 38, 84, [true, false, false]),
        vendor(4, "Tailspin Logistics", "tailspin", 31, 72, [false, false, false]),
        vendor(5, "Adventure Works Trading", "adventureworks", 44, 88, [true, true, true]),
    ]
}
