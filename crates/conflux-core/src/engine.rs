//! The identity-resolution pipeline.
//!
//! One call to [`identify`] handles one request: match the fragment against
//! stored records, resolve every match to its cluster's primary, merge
//! clusters when the fragment connects more than one, persist the fragment
//! if it carries new information, and aggregate the consolidated view.
//!
//! The whole pipeline runs against a single open [`RecordTx`], so the
//! backend's transaction makes the sequence atomic; any error unwinds with
//! nothing committed.

use std::collections::HashSet;

use crate::{
  Error, Result,
  record::{ContactId, ContactRecord, Fragment, NewContact},
  store::RecordTx,
  view::ConsolidatedIdentity,
};

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Resolve `fragment` to its consolidated identity, creating or merging
/// records as needed.
pub fn identify<T: RecordTx>(
  tx: &mut T,
  fragment: &Fragment,
) -> Result<ConsolidatedIdentity> {
  fragment.validate()?;

  let matched =
    tx.find_matches(fragment.email.as_deref(), fragment.phone_number.as_deref())?;

  // No match at all: the fragment is a brand-new identity.
  if matched.is_empty() {
    let record = tx.insert(NewContact {
      email:        fragment.email.clone(),
      phone_number: fragment.phone_number.clone(),
      linked_id:    None,
    })?;
    tracing::debug!(id = record.id, "created new primary contact");
    return Ok(ConsolidatedIdentity::of_single(&record));
  }

  let true_primary = merge_candidates(tx, &matched)?;
  create_if_new(tx, fragment, &matched, &true_primary)?;
  aggregate(tx, &true_primary)
}

// ─── Primary resolver ────────────────────────────────────────────────────────

/// Walk `linked_id` from `record` to the root of its cluster.
///
/// Iterative with a visited set: a revisited id means the linkage graph has
/// a cycle, which normal operation never produces but which must fail
/// cleanly rather than loop.
pub fn resolve_primary<T: RecordTx>(
  tx: &mut T,
  record: &ContactRecord,
) -> Result<ContactRecord> {
  let mut visited = HashSet::from([record.id]);
  let mut current = record.clone();

  while let Some(parent_id) = current.linked_id {
    if !visited.insert(parent_id) {
      tracing::error!(at = parent_id, "linkage cycle while resolving primary");
      return Err(Error::LinkCycle { at: parent_id });
    }
    current = tx.get(parent_id)?.ok_or(Error::BrokenLink {
      from: current.id,
      to:   parent_id,
    })?;
  }

  Ok(current)
}

// ─── Cluster merger ──────────────────────────────────────────────────────────

/// Resolve every match to its root, deduplicate the roots, and collapse them
/// to one true primary: earliest `created_at`, ties broken by smallest id.
/// Every other root is demoted beneath it in a single statement.
fn merge_candidates<T: RecordTx>(
  tx: &mut T,
  matched: &[ContactRecord],
) -> Result<ContactRecord> {
  let mut seen = HashSet::new();
  let mut candidates = Vec::new();
  for record in matched {
    let root = resolve_primary(tx, record)?;
    if seen.insert(root.id) {
      candidates.push(root);
    }
  }

  candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

  // `matched` is non-empty, so there is always at least one candidate root.
  let true_primary = candidates.remove(0);
  let demoted: Vec<ContactId> = candidates.iter().map(|c| c.id).collect();

  if !demoted.is_empty() {
    tracing::info!(
      primary = true_primary.id,
      demoted = ?demoted,
      "fragment connects multiple clusters, merging"
    );
    tx.demote(&demoted, true_primary.id)?;
  }

  Ok(true_primary)
}

// ─── Record creator ──────────────────────────────────────────────────────────

/// Persist the fragment as a secondary under `true_primary` unless some
/// matched record already carries exactly this `(email, phoneNumber)` pair,
/// in which case the fragment adds nothing.
fn create_if_new<T: RecordTx>(
  tx: &mut T,
  fragment: &Fragment,
  matched: &[ContactRecord],
  true_primary: &ContactRecord,
) -> Result<()> {
  if matched.iter().any(|r| fragment.matches_exactly(r)) {
    return Ok(());
  }

  let record = tx.insert(NewContact {
    email:        fragment.email.clone(),
    phone_number: fragment.phone_number.clone(),
    linked_id:    Some(true_primary.id),
  })?;
  tracing::debug!(
    id = record.id,
    primary = true_primary.id,
    "created secondary contact for new field combination"
  );
  Ok(())
}

// ─── Cluster aggregator ──────────────────────────────────────────────────────

/// Recompute the consolidated view for `primary` from its transitive
/// closure. Pure read; reflects every mutation made earlier in this
/// transaction.
fn aggregate<T: RecordTx>(
  tx: &mut T,
  primary: &ContactRecord,
) -> Result<ConsolidatedIdentity> {
  let cluster = tx.cluster_of(primary.id)?;
  Ok(ConsolidatedIdentity::from_cluster(primary, &cluster))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::{DateTime, Utc};

  use super::*;
  use crate::record::LinkPrecedence;

  /// Vec-backed [`RecordTx`] fake with a logical clock, so created-at
  /// ordering (and ties) can be controlled exactly.
  #[derive(Default)]
  struct MemTx {
    records: Vec<ContactRecord>,
    next_id: ContactId,
    clock:   i64,
  }

  fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("in range")
  }

  impl MemTx {
    fn tick(&mut self) -> DateTime<Utc> {
      self.clock += 1;
      ts(self.clock)
    }

    /// Seed a record directly, bypassing the engine. `created_at` is taken
    /// from `at` so tests can manufacture ties.
    fn seed(
      &mut self,
      email: Option<&str>,
      phone: Option<&str>,
      linked_id: Option<ContactId>,
      at: i64,
    ) -> ContactId {
      self.next_id += 1;
      let id = self.next_id;
      self.records.push(ContactRecord {
        id,
        email: email.map(str::to_owned),
        phone_number: phone.map(str::to_owned),
        linked_id,
        link_precedence: if linked_id.is_some() {
          LinkPrecedence::Secondary
        } else {
          LinkPrecedence::Primary
        },
        created_at: ts(at),
        updated_at: ts(at),
        deleted_at: None,
      });
      id
    }

    fn record(&self, id: ContactId) -> &ContactRecord {
      self
        .records
        .iter()
        .find(|r| r.id == id)
        .expect("record exists")
    }
  }

  impl RecordTx for MemTx {
    fn find_matches(
      &mut self,
      email: Option<&str>,
      phone: Option<&str>,
    ) -> Result<Vec<ContactRecord>> {
      Ok(
        self
          .records
          .iter()
          .filter(|r| {
            email.is_some_and(|e| r.email.as_deref() == Some(e))
              || phone.is_some_and(|p| r.phone_number.as_deref() == Some(p))
          })
          .cloned()
          .collect(),
      )
    }

    fn get(&mut self, id: ContactId) -> Result<Option<ContactRecord>> {
      Ok(self.records.iter().find(|r| r.id == id).cloned())
    }

    fn demote(&mut self, ids: &[ContactId], new_primary: ContactId) -> Result<()> {
      let now = self.tick();
      for record in &mut self.records {
        if ids.contains(&record.id) {
          record.link_precedence = LinkPrecedence::Secondary;
          record.linked_id = Some(new_primary);
          record.updated_at = now;
        }
      }
      Ok(())
    }

    fn insert(&mut self, new: NewContact) -> Result<ContactRecord> {
      let now = self.tick();
      self.next_id += 1;
      let record = ContactRecord {
        id:              self.next_id,
        email:           new.email,
        phone_number:    new.phone_number,
        linked_id:       new.linked_id,
        link_precedence: if new.linked_id.is_some() {
          LinkPrecedence::Secondary
        } else {
          LinkPrecedence::Primary
        },
        created_at:      now,
        updated_at:      now,
        deleted_at:      None,
      };
      self.records.push(record.clone());
      Ok(record)
    }

    fn cluster_of(&mut self, primary_id: ContactId) -> Result<Vec<ContactRecord>> {
      let children: Vec<ContactId> = self
        .records
        .iter()
        .filter(|r| r.linked_id == Some(primary_id))
        .map(|r| r.id)
        .collect();
      Ok(
        self
          .records
          .iter()
          .filter(|r| {
            r.id == primary_id
              || r.linked_id == Some(primary_id)
              || r.linked_id.is_some_and(|l| children.contains(&l))
          })
          .cloned()
          .collect(),
      )
    }
  }

  fn fragment(email: Option<&str>, phone: Option<&str>) -> Fragment {
    Fragment {
      email:        email.map(str::to_owned),
      phone_number: phone.map(str::to_owned),
    }
  }

  #[test]
  fn empty_fragment_is_rejected_without_mutation() {
    let mut tx = MemTx::default();
    let err = identify(&mut tx, &fragment(None, None)).unwrap_err();
    assert!(matches!(err, Error::Validation));
    assert!(tx.records.is_empty());
  }

  #[test]
  fn no_match_creates_primary() {
    let mut tx = MemTx::default();
    let view = identify(&mut tx, &fragment(Some("a@x.com"), None)).unwrap();

    assert_eq!(tx.records.len(), 1);
    assert!(tx.records[0].is_primary());
    assert_eq!(view.primary_contact_id, tx.records[0].id);
    assert_eq!(view.emails, ["a@x.com"]);
    assert!(view.phone_numbers.is_empty());
    assert!(view.secondary_contact_ids.is_empty());
  }

  #[test]
  fn exact_repeat_creates_nothing() {
    let mut tx = MemTx::default();
    let first = fragment(Some("a@x.com"), Some("111"));
    identify(&mut tx, &first).unwrap();
    let view = identify(&mut tx, &first).unwrap();

    assert_eq!(tx.records.len(), 1);
    assert!(view.secondary_contact_ids.is_empty());
  }

  #[test]
  fn exact_repeat_with_absent_field_creates_nothing() {
    let mut tx = MemTx::default();
    identify(&mut tx, &fragment(Some("a@x.com"), None)).unwrap();
    identify(&mut tx, &fragment(Some("a@x.com"), None)).unwrap();

    assert_eq!(tx.records.len(), 1);
  }

  #[test]
  fn new_combination_creates_secondary() {
    let mut tx = MemTx::default();
    let first = identify(&mut tx, &fragment(Some("a@x.com"), Some("111"))).unwrap();
    let view = identify(&mut tx, &fragment(Some("a@x.com"), Some("222"))).unwrap();

    assert_eq!(tx.records.len(), 2);
    assert_eq!(view.primary_contact_id, first.primary_contact_id);
    assert_eq!(view.secondary_contact_ids.len(), 1);

    let secondary = tx.record(view.secondary_contact_ids[0]);
    assert_eq!(secondary.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(secondary.linked_id, Some(first.primary_contact_id));
    assert_eq!(view.phone_numbers, ["111", "222"]);
  }

  #[test]
  fn merge_selects_oldest_as_primary() {
    let mut tx = MemTx::default();
    let p1 = tx.seed(Some("a@x.com"), None, None, 10);
    let p2 = tx.seed(None, Some("111"), None, 20);

    let view = identify(&mut tx, &fragment(Some("a@x.com"), Some("111"))).unwrap();

    assert_eq!(view.primary_contact_id, p1);
    let demoted = tx.record(p2);
    assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(demoted.linked_id, Some(p1));
    // The demoted primary and the new combined-pair record.
    assert_eq!(view.secondary_contact_ids.len(), 2);
    assert!(view.secondary_contact_ids.contains(&p2));
  }

  #[test]
  fn merge_tie_breaks_on_smaller_id() {
    let mut tx = MemTx::default();
    let p1 = tx.seed(Some("a@x.com"), None, None, 10);
    let p2 = tx.seed(None, Some("111"), None, 10);

    let view = identify(&mut tx, &fragment(Some("a@x.com"), Some("111"))).unwrap();

    assert_eq!(view.primary_contact_id, p1);
    assert_eq!(tx.record(p2).linked_id, Some(p1));
  }

  #[test]
  fn merge_aggregates_two_hop_secondaries() {
    let mut tx = MemTx::default();
    // Cluster A: primary with one secondary.
    let pa = tx.seed(Some("a@x.com"), None, None, 10);
    tx.seed(Some("a2@x.com"), Some("999"), Some(pa), 11);
    // Cluster B: younger primary with one secondary.
    let pb = tx.seed(None, Some("111"), None, 20);
    let sb = tx.seed(Some("b@x.com"), Some("111"), Some(pb), 21);

    // Connects both clusters; B's primary is demoted, so `sb` now sits two
    // hops from `pa`.
    let view = identify(&mut tx, &fragment(Some("a@x.com"), Some("111"))).unwrap();

    assert_eq!(view.primary_contact_id, pa);
    assert!(view.emails.contains(&"b@x.com".to_owned()));
    assert!(view.phone_numbers.contains(&"999".to_owned()));
    assert!(view.secondary_contact_ids.contains(&sb));
    // No duplicates despite "111" appearing on several records.
    let mut phones = view.phone_numbers.clone();
    phones.dedup();
    assert_eq!(phones, view.phone_numbers);
  }

  #[test]
  fn primary_email_is_listed_first() {
    let mut tx = MemTx::default();
    let p = tx.seed(Some("primary@x.com"), Some("111"), None, 10);
    tx.seed(Some("second@x.com"), Some("111"), Some(p), 11);

    let view = identify(&mut tx, &fragment(None, Some("111"))).unwrap();

    assert_eq!(view.emails[0], "primary@x.com");
  }

  #[test]
  fn resolver_collapses_multi_hop_chain() {
    let mut tx = MemTx::default();
    let root = tx.seed(Some("root@x.com"), None, None, 10);
    let mid = tx.seed(Some("mid@x.com"), None, Some(root), 11);
    let leaf = tx.seed(Some("leaf@x.com"), None, Some(mid), 12);

    let record = tx.record(leaf).clone();
    let resolved = resolve_primary(&mut tx, &record).unwrap();
    assert_eq!(resolved.id, root);
  }

  #[test]
  fn resolver_detects_cycle() {
    let mut tx = MemTx::default();
    let a = tx.seed(Some("a@x.com"), None, Some(2), 10);
    let b = tx.seed(Some("b@x.com"), None, Some(a), 11);
    assert_eq!(b, 2);

    let record = tx.record(a).clone();
    let err = resolve_primary(&mut tx, &record).unwrap_err();
    assert!(matches!(err, Error::LinkCycle { .. }));
  }

  #[test]
  fn resolver_reports_dangling_link() {
    let mut tx = MemTx::default();
    let a = tx.seed(Some("a@x.com"), None, Some(999), 10);

    let record = tx.record(a).clone();
    let err = resolve_primary(&mut tx, &record).unwrap_err();
    assert!(matches!(err, Error::BrokenLink { from, to } if from == a && to == 999));
  }

  /// The worked three-request scenario: two independent primaries connected
  /// by a third request carrying both fields.
  #[test]
  fn independent_primaries_then_connecting_fragment() {
    let mut tx = MemTx::default();

    let v1 = identify(&mut tx, &fragment(Some("a@x.com"), None)).unwrap();
    let v2 = identify(&mut tx, &fragment(None, Some("111"))).unwrap();
    assert_ne!(v1.primary_contact_id, v2.primary_contact_id);

    let v3 = identify(&mut tx, &fragment(Some("a@x.com"), Some("111"))).unwrap();

    assert_eq!(v3.primary_contact_id, v1.primary_contact_id);
    assert_eq!(v3.emails, ["a@x.com"]);
    assert_eq!(v3.phone_numbers, ["111"]);
    // The demoted second primary and the new combined-pair secondary.
    assert_eq!(v3.secondary_contact_ids.len(), 2);
    assert!(v3.secondary_contact_ids.contains(&v2.primary_contact_id));
    assert_eq!(tx.records.len(), 3);
  }
}
