//! The ledger calculator.
//!
//! Balances are always folded from the full transaction history; nothing here
//! keeps a running counter between calls. Only approved transactions count:
//! pending and rejected ones are inert regardless of type or amount.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  book::PepiBook,
  ci_payment::CiPayment,
  money::MoneyCents,
  review::ReviewStatus,
  transaction::{Transaction, TransactionType},
};

fn approved(txs: &[Transaction]) -> impl Iterator<Item = &Transaction> {
  txs.iter().filter(|t| t.is_approved())
}

fn approved_total(txs: &[Transaction], kind: TransactionType) -> MoneyCents {
  approved(txs)
    .filter(|t| t.transaction_type == kind)
    .map(|t| t.amount)
    .sum()
}

/// `starting + Σ approved issuances + Σ approved returns − Σ approved
/// spending`. Independent of the order of `txs`.
pub fn balance(starting: MoneyCents, txs: &[Transaction]) -> MoneyCents {
  starting + approved(txs).map(Transaction::signed_amount).sum::<MoneyCents>()
}

/// The balance counting only approved transactions created at or before `at`.
pub fn balance_as_of(
  starting: MoneyCents,
  txs: &[Transaction],
  at: DateTime<Utc>,
) -> MoneyCents {
  starting
    + approved(txs)
      .filter(|t| t.created_at <= at)
      .map(Transaction::signed_amount)
      .sum::<MoneyCents>()
}

/// Approved issuances other than the one that seeded the book. Reporting
/// only; never part of the authoritative balance.
pub fn additional_funds(txs: &[Transaction]) -> MoneyCents {
  approved(txs)
    .filter(|t| {
      t.transaction_type == TransactionType::Issuance && !t.is_initial_funding
    })
    .map(|t| t.amount)
    .sum()
}

/// Cash an agent should be holding: approved issuances to them minus their
/// approved spending and returns.
pub fn agent_cash_on_hand(agent_id: Uuid, txs: &[Transaction]) -> MoneyCents {
  approved(txs)
    .filter(|t| t.agent_id == Some(agent_id))
    .map(|t| match t.transaction_type {
      TransactionType::Issuance => t.amount,
      TransactionType::Spending | TransactionType::Return => -t.amount,
    })
    .sum()
}

/// One line of a running-balance listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningBalance {
  pub transaction_id: Uuid,
  pub created_at:     DateTime<Utc>,
  /// The balance after this transaction; unchanged by non-approved ones.
  pub balance:        MoneyCents,
}

/// Balance after each transaction, ordered by `created_at` then id.
pub fn running_balances(
  starting: MoneyCents,
  txs: &[Transaction],
) -> Vec<RunningBalance> {
  let mut ordered: Vec<&Transaction> = txs.iter().collect();
  ordered.sort_by_key(|t| (t.created_at, t.id));

  let mut current = starting;
  ordered
    .into_iter()
    .map(|t| {
      if t.is_approved() {
        current += t.signed_amount();
      }
      RunningBalance {
        transaction_id: t.id,
        created_at:     t.created_at,
        balance:        current,
      }
    })
    .collect()
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Point-in-time totals for one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
  pub book_id:              Uuid,
  pub year:                 i32,
  pub starting_amount:      MoneyCents,
  pub total_issued:         MoneyCents,
  pub total_spent:          MoneyCents,
  pub total_returned:       MoneyCents,
  pub additional_funds:     MoneyCents,
  pub ci_payments_approved: MoneyCents,
  pub pending_count:        usize,
  pub balance:              MoneyCents,
  /// Set once the book is closed; the live `balance` must agree with it.
  pub closing_balance:      Option<MoneyCents>,
}

pub fn summarize(
  book: &PepiBook,
  txs: &[Transaction],
  ci_payments: &[CiPayment],
) -> BookSummary {
  BookSummary {
    book_id:              book.id,
    year:                 book.year,
    starting_amount:      book.starting_amount,
    total_issued:         approved_total(txs, TransactionType::Issuance),
    total_spent:          approved_total(txs, TransactionType::Spending),
    total_returned:       approved_total(txs, TransactionType::Return),
    additional_funds:     additional_funds(txs),
    ci_payments_approved: ci_payments
      .iter()
      .filter(|p| p.review.status == ReviewStatus::Approved)
      .map(|p| p.amount)
      .sum(),
    pending_count:        txs
      .iter()
      .filter(|t| t.status() == ReviewStatus::Pending)
      .count(),
    balance:              balance(book.starting_amount, txs),
    closing_balance:      book.closing_balance,
  }
}

// ─── Monthly reconciliation ──────────────────────────────────────────────────

/// The figures behind a monthly reconciliation memo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyReconciliation {
  pub book_id:         Uuid,
  pub year:            i32,
  pub month:           u32,
  pub opening_balance: MoneyCents,
  pub issued:          MoneyCents,
  pub spent:           MoneyCents,
  pub returned:        MoneyCents,
  pub closing_balance: MoneyCents,
  /// Transactions created in the month that still await review.
  pub pending_count:   usize,
}

/// Reconcile `year`/`month` (UTC) for `book`.
pub fn reconcile_month(
  book: &PepiBook,
  txs: &[Transaction],
  year: i32,
  month: u32,
) -> Result<MonthlyReconciliation> {
  let start = month_start(year, month)?;
  let end = if month == 12 {
    month_start(year + 1, 1)?
  } else {
    month_start(year, month + 1)?
  };

  let opening_balance = book.starting_amount
    + approved(txs)
      .filter(|t| t.created_at < start)
      .map(Transaction::signed_amount)
      .sum::<MoneyCents>();

  let in_month: Vec<Transaction> = txs
    .iter()
    .filter(|t| t.created_at >= start && t.created_at < end)
    .cloned()
    .collect();

  let issued = approved_total(&in_month, TransactionType::Issuance);
  let spent = approved_total(&in_month, TransactionType::Spending);
  let returned = approved_total(&in_month, TransactionType::Return);

  Ok(MonthlyReconciliation {
    book_id: book.id,
    year,
    month,
    opening_balance,
    issued,
    spent,
    returned,
    closing_balance: opening_balance + issued + returned - spent,
    pending_count: in_month
      .iter()
      .filter(|t| t.status() == ReviewStatus::Pending)
      .count(),
  })
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>> {
  NaiveDate::from_ymd_opt(year, month, 1)
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| Utc.from_utc_datetime(&dt))
    .ok_or_else(|| Error::Validation(format!("invalid month {year}-{month:02}")))
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::transaction::fixtures::tx;
  use crate::review::ReviewStatus::*;
  use crate::transaction::TransactionType::*;

  fn book(starting: i64) -> PepiBook {
    PepiBook {
      id:              Uuid::new_v4(),
      year:            2025,
      starting_amount: MoneyCents::dollars(starting),
      is_active:       true,
      is_closed:       false,
      closing_balance: None,
      closed_at:       None,
      created_at:      Utc::now(),
    }
  }

  #[test]
  fn empty_history_is_starting_amount() {
    assert_eq!(balance(MoneyCents::dollars(1000), &[]), MoneyCents::dollars(1000));
  }

  #[test]
  fn approved_only_history_follows_formula() {
    let history = vec![
      tx(Issuance, 500, Approved),
      tx(Spending, 200, Approved),
      tx(Return, 30, Approved),
      tx(Spending, 45, Approved),
    ];
    let expected = MoneyCents::dollars(1000 + 500 + 30 - 200 - 45);
    assert_eq!(balance(MoneyCents::dollars(1000), &history), expected);

    let mut reversed = history.clone();
    reversed.reverse();
    assert_eq!(balance(MoneyCents::dollars(1000), &reversed), expected);
  }

  #[test]
  fn pending_and_rejected_are_inert() {
    let starting = MoneyCents::dollars(1000);
    for kind in [Issuance, Spending, Return] {
      for status in [Pending, Rejected] {
        let history = vec![tx(kind, 9999, status)];
        assert_eq!(balance(starting, &history), starting, "{kind} {status}");
      }
    }
  }

  #[test]
  fn scenario_issue_spend_and_ignore_pending() {
    let starting = MoneyCents::dollars(1000);
    let mut history = vec![tx(Issuance, 500, Approved)];
    assert_eq!(balance(starting, &history), MoneyCents::dollars(1500));

    history.push(tx(Spending, 200, Approved));
    assert_eq!(balance(starting, &history), MoneyCents::dollars(1300));

    history.push(tx(Spending, 9999, Pending));
    assert_eq!(balance(starting, &history), MoneyCents::dollars(1300));

    history.last_mut().unwrap().review.status = Rejected;
    assert_eq!(balance(starting, &history), MoneyCents::dollars(1300));
  }

  #[test]
  fn additional_funds_skips_initial_funding() {
    let mut seed = tx(Issuance, 1000, Approved);
    seed.is_initial_funding = true;
    let history = vec![
      seed,
      tx(Issuance, 250, Approved),
      tx(Issuance, 75, Pending),
      tx(Return, 40, Approved),
    ];
    assert_eq!(additional_funds(&history), MoneyCents::dollars(250));
  }

  #[test]
  fn cash_on_hand_tracks_one_agent() {
    let agent = Uuid::new_v4();
    let mut history = vec![
      tx(Issuance, 300, Approved),
      tx(Spending, 120, Approved),
      tx(Return, 50, Approved),
      tx(Spending, 10, Rejected),
      tx(Issuance, 999, Approved),
    ];
    for t in history.iter_mut().take(4) {
      t.agent_id = Some(agent);
    }
    assert_eq!(agent_cash_on_hand(agent, &history), MoneyCents::dollars(130));
  }

  #[test]
  fn point_in_time_and_running_balances() {
    let t0 = Utc::now() - Duration::days(3);
    let mut a = tx(Issuance, 100, Approved);
    a.created_at = t0;
    let mut b = tx(Spending, 40, Pending);
    b.created_at = t0 + Duration::days(1);
    let mut c = tx(Spending, 25, Approved);
    c.created_at = t0 + Duration::days(2);
    let history = vec![c.clone(), a.clone(), b.clone()];

    let starting = MoneyCents::dollars(10);
    assert_eq!(
      balance_as_of(starting, &history, t0 + Duration::hours(1)),
      MoneyCents::dollars(110)
    );

    let running = running_balances(starting, &history);
    let ids: Vec<_> = running.iter().map(|r| r.transaction_id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);
    let balances: Vec<_> = running.iter().map(|r| r.balance).collect();
    assert_eq!(
      balances,
      vec![MoneyCents::dollars(110), MoneyCents::dollars(110), MoneyCents::dollars(85)]
    );
  }

  #[test]
  fn monthly_reconciliation_splits_opening_and_month() {
    let b = book(1000);
    let at = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();

    let mut before = tx(Issuance, 200, Approved);
    before.created_at = at(2025, 2, 20);
    let mut spend = tx(Spending, 75, Approved);
    spend.created_at = at(2025, 3, 5);
    let mut ret = tx(Return, 15, Approved);
    ret.created_at = at(2025, 3, 31);
    let mut waiting = tx(Spending, 60, Pending);
    waiting.created_at = at(2025, 3, 10);
    let mut after = tx(Spending, 500, Approved);
    after.created_at = at(2025, 4, 1);

    let history = vec![before, spend, ret, waiting, after];
    let rec = reconcile_month(&b, &history, 2025, 3).unwrap();

    assert_eq!(rec.opening_balance, MoneyCents::dollars(1200));
    assert_eq!(rec.spent, MoneyCents::dollars(75));
    assert_eq!(rec.returned, MoneyCents::dollars(15));
    assert_eq!(rec.issued, MoneyCents::ZERO);
    assert_eq!(rec.closing_balance, MoneyCents::dollars(1140));
    assert_eq!(rec.pending_count, 1);
  }

  #[test]
  fn december_rolls_into_next_year_and_bad_months_fail() {
    let b = book(10);
    assert!(reconcile_month(&b, &[], 2025, 12).is_ok());
    assert!(matches!(
      reconcile_month(&b, &[], 2025, 13),
      Err(Error::Validation(_))
    ));
  }

  #[test]
  fn summary_counts_pending_and_totals() {
    let b = book(1000);
    let history = vec![
      tx(Issuance, 500, Approved),
      tx(Spending, 200, Approved),
      tx(Spending, 9999, Pending),
    ];
    let s = summarize(&b, &history, &[]);
    assert_eq!(s.balance, MoneyCents::dollars(1300));
    assert_eq!(s.total_issued, MoneyCents::dollars(500));
    assert_eq!(s.total_spent, MoneyCents::dollars(200));
    assert_eq!(s.pending_count, 1);
  }
}
