use chrono::Utc;
use sqlx::Row;

use rfpdesk_core::collaborators::{CollaboratorError, VendorDirectory};
use rfpdesk_core::domain::vendor::{VendorAttributes, VendorContact, VendorId, VendorProfile};

use super::{decode_decimal, decode_error, encode_time, RepositoryError};
use crate::DbPool;

/// Vendor directory backed by the local `vendor` table.
pub struct SqlVendorDirectory {
    pool: DbPool,
}

impl SqlVendorDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Seeding/maintenance write path. The engine itself only reads.
    pub async fn upsert(&self, vendor: &VendorProfile) -> Result<(), RepositoryError> {
        let now = encode_time(&Utc::now());
        sqlx::query(
            "INSERT INTO vendor (id, name, email, phone, company, address,
                                 email_verified, phone_verified, business_verified,
                                 overall_rating, on_time_delivery_rate, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 phone = excluded.phone,
                 company = excluded.company,
                 address = excluded.address,
                 email_verified = excluded.email_verified,
                 phone_verified = excluded.phone_verified,
                 business_verified = excluded.business_verified,
                 overall_rating = excluded.overall_rating,
                 on_time_delivery_rate = excluded.on_time_delivery_rate,
                 updated_at = excluded.updated_at",
        )
        .bind(vendor.id.0)
        .bind(&vendor.contact.name)
        .bind(&vendor.contact.email)
        .bind(&vendor.contact.phone)
        .bind(&vendor.contact.company)
        .bind(&vendor.contact.address)
        .bind(vendor.attributes.email_verified)
        .bind(vendor.attributes.phone_verified)
        .bind(vendor.attributes.business_verified)
        .bind(vendor.attributes.overall_rating.to_string())
        .bind(vendor.attributes.on_time_delivery_rate.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, vendor_id: VendorId) -> Result<Option<VendorProfile>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {VENDOR_COLUMNS} FROM vendor WHERE id = ?"))
            .bind(vendor_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_vendor).transpose()
    }

    pub async fn list(&self) -> Result<Vec<VendorProfile>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {VENDOR_COLUMNS} FROM vendor ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_vendor).collect()
    }
}

const VENDOR_COLUMNS: &str = "id, name, email, phone, company, address, email_verified,
     phone_verified, business_verified, overall_rating, on_time_delivery_rate";

fn row_to_vendor(row: &sqlx::sqlite::SqliteRow) -> Result<VendorProfile, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let overall_rating: String = row.try_get("overall_rating").map_err(decode_error)?;
    let on_time_delivery_rate: String =
        row.try_get("on_time_delivery_rate").map_err(decode_error)?;

    Ok(VendorProfile {
        id: VendorId(id),
        contact: VendorContact {
            name: row.try_get("name").map_err(decode_error)?,
            email: row.try_get("email").map_err(decode_error)?,
            phone: row.try_get("phone").map_err(decode_error)?,
            company: row.try_get("company").map_err(decode_error)?,
            address: row.try_get("address").map_err(decode_error)?,
        },
        attributes: VendorAttributes {
            email_verified: row.try_get("email_verified").map_err(decode_error)?,
            phone_verified: row.try_get("phone_verified").map_err(decode_error)?,
            business_verified: row.try_get("business_verified").map_err(decode_error)?,
            overall_rating: decode_decimal("vendor.overall_rating", &overall_rating)?,
            on_time_delivery_rate: decode_decimal(
                "vendor.on_time_delivery_rate",
                &on_time_delivery_rate,
            )?,
        },
    })
}

fn unavailable(error: RepositoryError) -> CollaboratorError {
    CollaboratorError::Unavailable(error.to_string())
}

#[async_trait::async_trait]
impl VendorDirectory for SqlVendorDirectory {
    async fn get_by_id(&self, vendor_id: VendorId) -> Result<VendorProfile, CollaboratorError> {
        self.find(vendor_id)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| CollaboratorError::NotFound(format!("vendor {vendor_id}")))
    }

    async fn list_all(&self) -> Result<Vec<VendorProfile>, CollaboratorError> {
        self.list().await.map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use rfpdesk_core::collaborators::{CollaboratorError, VendorDirectory};
    use rfpdesk_core::domain::vendor::{VendorAttributes, VendorContact, VendorId, VendorProfile};

    use super::SqlVendorDirectory;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlVendorDirectory {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlVendorDirectory::new(pool)
    }

    fn vendor(id: i64, name: &str) -> VendorProfile {
        VendorProfile {
            id: VendorId(id),
            contact: VendorContact {
                name: name.to_string(),
                email: format!("sales@{}.test", name.to_lowercase()),
                phone: Some("+1 555 0100".to_string()),
                company: Some(format!("{name} Ltd")),
                address: None,
            },
            attributes: VendorAttributes {
                email_verified: true,
                phone_verified: false,
                business_verified: true,
                overall_rating: Decimal::new(45, 1),
                on_time_delivery_rate: Decimal::new(925, 1),
            },
        }
    }

    #[tokio::test]
    async fn upserted_vendor_is_readable_through_directory() {
        let directory = setup().await;
        directory.upsert(&vendor(2, "Beta")).await.expect("upsert beta");
        directory.upsert(&vendor(1, "Alpha")).await.expect("upsert alpha");

        let found = directory.get_by_id(VendorId(1)).await.expect("get alpha");
        assert_eq!(found, vendor(1, "Alpha"));

        let all = directory.list_all().await.expect("list");
        assert_eq!(all.iter().map(|v| v.id.0).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn unknown_vendor_is_not_found() {
        let directory = setup().await;
        let error = directory.get_by_id(VendorId(404)).await.expect_err("missing");
        assert!(matches!(error, CollaboratorError::NotFound(_)));
    }
}
