use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::{CreditEngine, Ledger};
use crate::domain::{Account, AccountId, Credit, CreditId, Installment, OwnerId, format_cents};

/// Everything one owner holds, for a full JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub owner_id: OwnerId,
    pub accounts: Vec<Account>,
    pub credits: Vec<CreditSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditSnapshot {
    pub credit: Credit,
    pub schedule: Vec<Installment>,
}

/// Exporter for converting ledger and credit data to CSV or JSON
pub struct Exporter<'a> {
    ledger: &'a Ledger,
    credits: &'a CreditEngine,
}

impl<'a> Exporter<'a> {
    pub fn new(ledger: &'a Ledger, credits: &'a CreditEngine) -> Self {
        Self { ledger, credits }
    }

    /// Export a credit's repayment schedule to CSV format
    pub async fn export_schedule_csv<W: Write>(
        &self,
        owner_id: OwnerId,
        credit_id: CreditId,
        writer: W,
    ) -> Result<usize> {
        let schedule = self.credits.get_schedule(owner_id, credit_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["number", "installment_id", "due_date", "amount", "paid"])?;

        let mut count = 0;
        for (index, installment) in schedule.iter().enumerate() {
            csv_writer.write_record([
                (index + 1).to_string(),
                installment.id.to_string(),
                installment.due_date.date_naive().to_string(),
                format_cents(installment.amount),
                installment.paid.to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export an account statement to CSV format. Amounts are signed from the
    /// account's point of view.
    pub async fn export_transactions_csv<W: Write>(
        &self,
        owner_id: OwnerId,
        account_id: AccountId,
        writer: W,
    ) -> Result<usize> {
        let transactions = self.ledger.list_transactions(account_id, owner_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "timestamp", "from_account", "to_account", "amount", "currency"])?;

        let mut count = 0;
        for tx in &transactions {
            csv_writer.write_record([
                tx.id.to_string(),
                tx.created_at.to_rfc3339(),
                tx.from_account.map(|id| id.to_string()).unwrap_or_default(),
                tx.to_account.to_string(),
                format_cents(tx.effect_on(account_id)),
                tx.currency.clone(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export an owner's accounts, credits and schedules as a JSON snapshot
    pub async fn export_owner_json<W: Write>(
        &self,
        owner_id: OwnerId,
        mut writer: W,
    ) -> Result<OwnerSnapshot> {
        let accounts = self.ledger.list_accounts(owner_id).await?;

        let mut credits = Vec::new();
        for credit in self.credits.list_credits_for_owner(owner_id).await? {
            let schedule = self.credits.get_schedule(owner_id, credit.id).await?;
            credits.push(CreditSnapshot { credit, schedule });
        }

        let snapshot = OwnerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            owner_id,
            accounts,
            credits,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
