//! CSV format handling for account fixtures, movements and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - `AccountCsvRecord` / `MovementCsvRecord` structures for deserialization
//! - The `CsvRow` conversion from raw records to domain requests
//! - Balance output serialization
//!
//! All functions are pure (no I/O beyond the given writer) for easy testing.

use crate::types::{
    Account, AccountRef, AccountType, LedgerError, MovementRequest, NewAccount, OwnerId, Payee,
    TransactionType, TransactionUid, UserId,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// A raw CSV row that converts into a domain value
///
/// Readers are generic over this trait so the same streaming code serves
/// both the accounts fixture and the movements file.
pub trait CsvRow: DeserializeOwned {
    type Output;

    /// Convert the raw row, describing the problem on failure
    fn convert(self) -> Result<Self::Output, String>;
}

/// Row of the accounts fixture
///
/// Columns: account_number, owner, type, holder, opening_deposit
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountCsvRecord {
    pub account_number: String,
    pub owner: OwnerId,
    #[serde(rename = "type")]
    pub account_type: String,
    pub holder: String,
    pub opening_deposit: Option<String>,
}

/// Account to register, with the deposit to post once it exists
#[derive(Debug, Clone, PartialEq)]
pub struct AccountFixture {
    pub account: NewAccount,
    pub opening_deposit: Option<Decimal>,
}

/// Row of the movements file
///
/// Columns: type, uid, from, to, amount, initiated_by, description.
/// For payments `to` holds the payee as `biller:reference`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MovementCsvRecord {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub uid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: String,
    pub initiated_by: UserId,
    pub description: Option<String>,
}

/// Keep only fields that carry text
fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

fn parse_amount(raw: &str, context: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|_| format!("Invalid amount '{}' for {}", raw, context))
}

impl CsvRow for AccountCsvRecord {
    type Output = AccountFixture;

    fn convert(self) -> Result<AccountFixture, String> {
        if self.account_number.trim().is_empty() {
            return Err("Account row without an account number".to_string());
        }
        let account_type = AccountType::from_str(&self.account_type)
            .map_err(|e| format!("{} for account {}", e, self.account_number))?;
        let opening_deposit = match non_empty(self.opening_deposit) {
            Some(raw) => Some(parse_amount(&raw, &format!("account {}", self.account_number))?),
            None => None,
        };

        Ok(AccountFixture {
            account: NewAccount {
                account_number: self.account_number,
                owner_id: self.owner,
                holder_name: self.holder.trim().to_string(),
                account_type,
            },
            opening_deposit,
        })
    }
}

impl CsvRow for MovementCsvRecord {
    type Output = MovementRequest;

    /// Build a movement request from the row
    ///
    /// Checks that the columns required by the movement type are present.
    /// Amount sign, precision and account state are left to the engine.
    fn convert(self) -> Result<MovementRequest, String> {
        let tx_type = TransactionType::from_str(&self.tx_type)
            .map_err(|_| format!("Invalid transaction type: '{}'", self.tx_type))?;
        let uid = match non_empty(self.uid) {
            Some(raw) => Some(TransactionUid::from_str(&raw).map_err(|e| e.to_string())?),
            None => None,
        };
        let context = match &uid {
            Some(uid) => format!("{} {}", tx_type, uid),
            None => tx_type.to_string(),
        };
        let amount = parse_amount(&self.amount, &context)?;

        let from = non_empty(self.from);
        let to = non_empty(self.to);
        let require = |field: Option<String>, column: &str| {
            field.ok_or_else(|| format!("{} requires a '{}' column", context, column))
        };

        let request = match tx_type {
            TransactionType::Transfer => MovementRequest::transfer(
                AccountRef::number(&require(from, "from")?),
                AccountRef::number(&require(to, "to")?),
                amount,
                self.initiated_by,
            ),
            TransactionType::Deposit => MovementRequest::deposit(
                AccountRef::number(&require(to, "to")?),
                amount,
                self.initiated_by,
            ),
            TransactionType::Withdrawal => MovementRequest::withdrawal(
                AccountRef::number(&require(from, "from")?),
                amount,
                self.initiated_by,
            ),
            TransactionType::Payment => MovementRequest::payment(
                AccountRef::number(&require(from, "from")?),
                Payee::parse(&require(to, "to")?),
                amount,
                self.initiated_by,
            ),
        };

        let request = match non_empty(self.description) {
            Some(description) => request.with_description(description),
            None => request,
        };
        Ok(match uid {
            Some(uid) => request.with_key(uid),
            None => request,
        })
    }
}

/// Write account balances to CSV format
///
/// Columns: account_number, owner, type, status, balance, available_balance.
/// Accounts are sorted by account id for deterministic output.
///
/// # Arguments
///
/// * `accounts` - Accounts to write
/// * `scale` - Decimal places for amounts
/// * `output` - Writer receiving the CSV
pub fn write_accounts_csv(
    accounts: &[Account],
    scale: u32,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "account_number",
        "owner",
        "type",
        "status",
        "balance",
        "available_balance",
    ])?;

    let mut sorted_accounts: Vec<&Account> = accounts.iter().collect();
    sorted_accounts.sort_by_key(|account| account.account_id);

    let precision = scale as usize;
    for account in sorted_accounts {
        writer.write_record(&[
            account.account_number.clone(),
            account.owner_id.to_string(),
            account.account_type.as_str().to_string(),
            account.status.as_str().to_string(),
            format!("{:.*}", precision, account.balance),
            format!("{:.*}", precision, account.available_balance),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, Biller};
    use chrono::Utc;
    use rstest::rstest;

    fn movement(
        tx_type: &str,
        uid: &str,
        from: &str,
        to: &str,
        amount: &str,
    ) -> MovementCsvRecord {
        MovementCsvRecord {
            tx_type: tx_type.to_string(),
            uid: Some(uid.to_string()),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            amount: amount.to_string(),
            initiated_by: 7,
            description: None,
        }
    }

    #[test]
    fn test_convert_transfer() {
        let request = movement("Transfer", "t-1", " acc1 ", "ACC2", "10.50")
            .convert()
            .unwrap();

        assert_eq!(request.tx_type, TransactionType::Transfer);
        assert_eq!(request.from, Some(AccountRef::Number("ACC1".to_string())));
        assert_eq!(request.to, Some(AccountRef::Number("ACC2".to_string())));
        assert_eq!(request.amount, Decimal::new(1050, 2));
        assert_eq!(request.initiated_by, 7);
        assert_eq!(request.idempotency_key.unwrap().as_str(), "t-1");
    }

    #[test]
    fn test_convert_payment_reads_payee() {
        let mut record = movement("payment", "p-1", "ACC1", "electric:EL-778", "42");
        record.description = Some("October".to_string());
        let request = record.convert().unwrap();

        let payee = request.payee.clone().unwrap();
        assert_eq!(payee.biller, Biller::Electric);
        assert_eq!(payee.reference, "EL-778");
        assert_eq!(request.to, None);
        assert_eq!(request.description.as_deref(), Some("October"));
    }

    #[test]
    fn test_convert_without_uid_leaves_key_to_engine() {
        let mut record = movement("deposit", "", "", "ACC1", "5");
        record.uid = None;
        let request = record.convert().unwrap();
        assert!(request.idempotency_key.is_none());
        assert!(request.from.is_none());
    }

    #[rstest]
    #[case::unknown_type(movement("refund", "x", "ACC1", "ACC2", "1"), "Invalid transaction type")]
    #[case::bad_amount(movement("deposit", "x", "", "ACC1", "ten"), "Invalid amount")]
    #[case::transfer_without_to(movement("transfer", "x", "ACC1", " ", "1"), "'to'")]
    #[case::withdrawal_without_from(movement("withdrawal", "x", "", "ACC1", "1"), "'from'")]
    #[case::payment_without_payee(movement("payment", "x", "ACC1", "", "1"), "'to'")]
    fn test_convert_rejections(#[case] record: MovementCsvRecord, #[case] expected: &str) {
        let err = record.convert().unwrap_err();
        assert!(err.contains(expected), "unexpected error: {}", err);
    }

    #[test]
    fn test_convert_account_fixture() {
        let fixture = AccountCsvRecord {
            account_number: "ACC1".to_string(),
            owner: 3,
            account_type: "Savings".to_string(),
            holder: " Alice Smith ".to_string(),
            opening_deposit: Some("100.00".to_string()),
        }
        .convert()
        .unwrap();

        assert_eq!(fixture.account.account_type, AccountType::Savings);
        assert_eq!(fixture.account.holder_name, "Alice Smith");
        assert_eq!(fixture.opening_deposit, Some(Decimal::new(10000, 2)));
    }

    #[rstest]
    #[case::bad_type("brokerage", None)]
    #[case::bad_deposit("checking", Some("lots"))]
    fn test_account_fixture_rejections(#[case] account_type: &str, #[case] deposit: Option<&str>) {
        let record = AccountCsvRecord {
            account_number: "ACC1".to_string(),
            owner: 3,
            account_type: account_type.to_string(),
            holder: "Alice".to_string(),
            opening_deposit: deposit.map(str::to_string),
        };
        assert!(record.convert().is_err());
    }

    #[test]
    fn test_write_accounts_csv_sorts_and_scales() {
        let mut second = Account::new(2, "ACC2".into(), 9, "Bob".into(), AccountType::Savings, Utc::now());
        second.balance = Decimal::new(755, 1);
        second.available_balance = Decimal::new(755, 1);
        second.status = AccountStatus::Frozen;
        let first = Account::new(1, "ACC1".into(), 8, "Alice".into(), AccountType::Checking, Utc::now());

        let mut output = Vec::new();
        write_accounts_csv(&[second, first], 2, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "account_number,owner,type,status,balance,available_balance",
                "ACC1,8,checking,active,0.00,0.00",
                "ACC2,9,savings,frozen,75.50,75.50",
            ]
        );
    }
}
