//! Movement request and receipt types
//!
//! A movement request is the single input shape shared by transfers, deposits,
//! withdrawals and bill payments. The engine answers each request with a
//! [`MovementReceipt`] or a typed [`LedgerError`](super::LedgerError).

use super::account::{normalize_account_number, AccountBalance, AccountId, AccountNumber};
use super::transaction::{Transaction, TransactionType, TransactionUid, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to an account, either by internal id or by external number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountRef {
    Id(AccountId),
    Number(AccountNumber),
}

impl AccountRef {
    /// Build a number reference, normalizing the customer input
    pub fn number(raw: &str) -> Self {
        AccountRef::Number(normalize_account_number(raw))
    }
}

impl From<AccountId> for AccountRef {
    fn from(id: AccountId) -> Self {
        AccountRef::Id(id)
    }
}

impl From<&str> for AccountRef {
    fn from(raw: &str) -> Self {
        AccountRef::number(raw)
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "#{}", id),
            AccountRef::Number(number) => f.write_str(number),
        }
    }
}

/// External payees accepted for bill payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Biller {
    Electric,
    Water,
    Internet,
    Phone,
    Credit,
    Insurance,
    Rent,
    Other,
}

impl Biller {
    pub fn as_str(&self) -> &'static str {
        match self {
            Biller::Electric => "electric",
            Biller::Water => "water",
            Biller::Internet => "internet",
            Biller::Phone => "phone",
            Biller::Credit => "credit",
            Biller::Insurance => "insurance",
            Biller::Rent => "rent",
            Biller::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Biller::Electric => "Electric Company",
            Biller::Water => "Water Utility",
            Biller::Internet => "Internet Provider",
            Biller::Phone => "Phone Company",
            Biller::Credit => "Credit Card",
            Biller::Insurance => "Insurance",
            Biller::Rent => "Rent",
            Biller::Other => "Other",
        }
    }
}

impl fmt::Display for Biller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Biller {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "electric" => Ok(Biller::Electric),
            "water" => Ok(Biller::Water),
            "internet" => Ok(Biller::Internet),
            "phone" => Ok(Biller::Phone),
            "credit" => Ok(Biller::Credit),
            "insurance" => Ok(Biller::Insurance),
            "rent" => Ok(Biller::Rent),
            "other" => Ok(Biller::Other),
            other => Err(format!("unknown biller '{}'", other)),
        }
    }
}

/// External destination of a bill payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payee {
    pub biller: Biller,
    /// Customer's account reference at the biller
    pub reference: String,
}

impl Payee {
    /// Parse `biller:reference`; a bare reference is paid to [`Biller::Other`]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some((biller, reference)) = raw.split_once(':') {
            if let Ok(biller) = biller.parse::<Biller>() {
                return Payee {
                    biller,
                    reference: reference.trim().to_string(),
                };
            }
        }
        Payee {
            biller: Biller::Other,
            reference: raw.to_string(),
        }
    }
}

/// A request to move money
///
/// Built through the per-type constructors so that endpoints always match
/// the transaction type; the engine still re-checks the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRequest {
    pub tx_type: TransactionType,

    /// Debited account (transfers, withdrawals, payments)
    pub from: Option<AccountRef>,

    /// Credited account (transfers, deposits)
    pub to: Option<AccountRef>,

    /// Bill payments only
    pub payee: Option<Payee>,

    pub amount: Decimal,

    /// Free text; a type-specific default is used when absent
    pub description: Option<String>,

    /// Already-authenticated user on whose behalf the movement runs
    pub initiated_by: UserId,

    /// Idempotency key; generated by the engine when absent
    pub idempotency_key: Option<TransactionUid>,
}

impl MovementRequest {
    fn new(
        tx_type: TransactionType,
        from: Option<AccountRef>,
        to: Option<AccountRef>,
        amount: Decimal,
        initiated_by: UserId,
    ) -> Self {
        MovementRequest {
            tx_type,
            from,
            to,
            payee: None,
            amount,
            description: None,
            initiated_by,
            idempotency_key: None,
        }
    }

    pub fn transfer(
        from: impl Into<AccountRef>,
        to: impl Into<AccountRef>,
        amount: Decimal,
        initiated_by: UserId,
    ) -> Self {
        Self::new(
            TransactionType::Transfer,
            Some(from.into()),
            Some(to.into()),
            amount,
            initiated_by,
        )
    }

    pub fn deposit(to: impl Into<AccountRef>, amount: Decimal, initiated_by: UserId) -> Self {
        Self::new(
            TransactionType::Deposit,
            None,
            Some(to.into()),
            amount,
            initiated_by,
        )
    }

    pub fn withdrawal(from: impl Into<AccountRef>, amount: Decimal, initiated_by: UserId) -> Self {
        Self::new(
            TransactionType::Withdrawal,
            Some(from.into()),
            None,
            amount,
            initiated_by,
        )
    }

    pub fn payment(
        from: impl Into<AccountRef>,
        payee: Payee,
        amount: Decimal,
        initiated_by: UserId,
    ) -> Self {
        let mut request = Self::new(
            TransactionType::Payment,
            Some(from.into()),
            None,
            amount,
            initiated_by,
        );
        request.payee = Some(payee);
        request
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_key(mut self, key: TransactionUid) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Description as it will be recorded, before length truncation
    ///
    /// Payments always carry the biller reference so the statement line
    /// identifies the bill that was paid.
    pub fn effective_description(&self) -> String {
        let given = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        match (self.tx_type, &self.payee) {
            (TransactionType::Payment, Some(payee)) => {
                let base = given
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Bill payment - {}", payee.biller.display_name()));
                format!("{} - Acc: {}", base, payee.reference)
            }
            (tx_type, _) => given.map(str::to_string).unwrap_or_else(|| match tx_type {
                TransactionType::Deposit => "Deposit".to_string(),
                TransactionType::Withdrawal => "Withdrawal".to_string(),
                TransactionType::Payment => "Bill payment".to_string(),
                TransactionType::Transfer => "Transfer".to_string(),
            }),
        }
    }
}

/// Successful outcome of a movement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementReceipt {
    /// The completed transaction
    pub transaction: Transaction,

    /// Balances of every account the transaction touched
    pub balances: Vec<AccountBalance>,

    /// `true` when the idempotency key matched an earlier committed movement
    pub replayed: bool,
}

impl MovementReceipt {
    pub fn transaction_uid(&self) -> &TransactionUid {
        &self.transaction.transaction_uid
    }

    pub fn balance_of(&self, account_number: &str) -> Option<&AccountBalance> {
        self.balances
            .iter()
            .find(|b| b.account_number == account_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_account_ref_normalizes_numbers() {
        assert_eq!(
            AccountRef::from(" acc42 "),
            AccountRef::Number("ACC42".to_string())
        );
        assert_eq!(AccountRef::from(7u64), AccountRef::Id(7));
    }

    #[rstest]
    #[case::known("electric:12-34", Biller::Electric, "12-34")]
    #[case::case_insensitive("RENT: flat 2", Biller::Rent, "flat 2")]
    #[case::bare("998877", Biller::Other, "998877")]
    #[case::unknown_prefix("gas:1", Biller::Other, "gas:1")]
    fn test_payee_parse(#[case] raw: &str, #[case] biller: Biller, #[case] reference: &str) {
        let payee = Payee::parse(raw);
        assert_eq!(payee.biller, biller);
        assert_eq!(payee.reference, reference);
    }

    #[test]
    fn test_constructors_set_endpoints() {
        let transfer = MovementRequest::transfer("a", "b", Decimal::ONE, 1);
        assert!(transfer.from.is_some() && transfer.to.is_some());

        let deposit = MovementRequest::deposit("a", Decimal::ONE, 1);
        assert!(deposit.from.is_none() && deposit.to.is_some());

        let withdrawal = MovementRequest::withdrawal("a", Decimal::ONE, 1);
        assert!(withdrawal.from.is_some() && withdrawal.to.is_none());
    }

    #[rstest]
    #[case::payment_default(None, "Bill payment - Water Utility - Acc: W-1")]
    #[case::payment_custom(Some("March"), "March - Acc: W-1")]
    #[case::payment_blank(Some("   "), "Bill payment - Water Utility - Acc: W-1")]
    fn test_payment_description(#[case] given: Option<&str>, #[case] expected: &str) {
        let mut request = MovementRequest::payment(
            "ACC1",
            Payee::parse("water:W-1"),
            Decimal::ONE,
            1,
        );
        request.description = given.map(str::to_string);
        assert_eq!(request.effective_description(), expected);
    }

    #[test]
    fn test_default_descriptions() {
        assert_eq!(
            MovementRequest::deposit("a", Decimal::ONE, 1).effective_description(),
            "Deposit"
        );
        assert_eq!(
            MovementRequest::transfer("a", "b", Decimal::ONE, 1)
                .with_description("  rent share ")
                .effective_description(),
            "rent share"
        );
    }
}
