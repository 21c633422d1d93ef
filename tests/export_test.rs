mod common;

use anyhow::Result;
use common::{parse_date, test_env};
use fenus::cli::{Cli, Commands};
use fenus::config::AppConfig;
use fenus::domain::HOUSE_ACCOUNT_ID;
use fenus::io::Exporter;
use rust_decimal_macros::dec;
use tempfile::TempDir;

#[tokio::test]
async fn test_export_schedule_csv() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 0).await?;
    let created = env
        .credits
        .create_credit_at(1, account.id, 12_000_000, Some(dec!(12)), 12, parse_date("2024-03-15"))
        .await?;

    let exporter = Exporter::new(&env.ledger, &env.credits);
    let mut buffer = Vec::new();
    let count = exporter
        .export_schedule_csv(1, created.credit.id, &mut buffer)
        .await?;
    assert_eq!(count, 12);

    let output = String::from_utf8(buffer)?;
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 13);
    assert_eq!(lines[0], "number,installment_id,due_date,amount,paid");
    assert!(lines[1].starts_with("1,"));
    assert!(lines[1].ends_with(",2024-04-15,10661.85,false"));

    // Foreign owner cannot export the schedule
    assert!(
        exporter
            .export_schedule_csv(2, created.credit.id, Vec::new())
            .await
            .is_err()
    );

    Ok(())
}

#[tokio::test]
async fn test_export_transactions_csv_signs_amounts() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 50_000).await?;
    env.ledger
        .transfer(account.id, HOUSE_ACCOUNT_ID, 12_345)
        .await?;

    let exporter = Exporter::new(&env.ledger, &env.credits);
    let mut buffer = Vec::new();
    let count = exporter
        .export_transactions_csv(1, account.id, &mut buffer)
        .await?;
    assert_eq!(count, 2);

    let output = String::from_utf8(buffer)?;
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines[0],
        "id,timestamp,from_account,to_account,amount,currency"
    );
    assert!(lines[1].ends_with(&format!(",,{},500.00,RUB", account.id)));
    assert!(lines[2].ends_with(&format!(",{},0,-123.45,RUB", account.id)));

    Ok(())
}

#[tokio::test]
async fn test_export_owner_json() -> Result<()> {
    let env = test_env().await?;
    let account = env.funded_account(1, 0).await?;
    env.credits
        .create_credit(1, account.id, 100_000, Some(dec!(12)), 3)
        .await?;

    let exporter = Exporter::new(&env.ledger, &env.credits);
    let mut buffer = Vec::new();
    let snapshot = exporter.export_owner_json(1, &mut buffer).await?;

    assert_eq!(snapshot.accounts.len(), 1);
    assert_eq!(snapshot.credits.len(), 1);
    assert_eq!(snapshot.credits[0].schedule.len(), 3);

    let parsed: serde_json::Value = serde_json::from_slice(&buffer)?;
    assert_eq!(parsed["owner_id"], 1);
    assert_eq!(parsed["credits"][0]["schedule"].as_array().unwrap().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_cli_export_validates_type_before_creating_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let database = temp_dir.path().join("cli.db").display().to_string();
    let output = temp_dir.path().join("out.csv");

    let cli = |command: Commands| Cli {
        database: Some(database.clone()),
        verbose: false,
        command,
    };
    cli(Commands::Init).run(AppConfig::default()).await?;

    let export = |export_type: &str, id: Option<i64>| {
        cli(Commands::Export {
            export_type: export_type.to_string(),
            owner: 1,
            id,
            output: Some(output.display().to_string()),
        })
    };

    assert!(export("ledger", None).run(AppConfig::default()).await.is_err());
    assert!(!output.exists());

    // Missing id for a schedule export is caught just as early
    assert!(export("schedule", None).run(AppConfig::default()).await.is_err());
    assert!(!output.exists());

    export("owner", None).run(AppConfig::default()).await?;
    let parsed: serde_json::Value = serde_json::from_slice(&std::fs::read(&output)?)?;
    assert_eq!(parsed["owner_id"], 1);

    Ok(())
}
