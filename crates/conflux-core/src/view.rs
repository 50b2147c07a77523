//! The consolidated identity — the computed read model returned for a
//! cluster after any mutation.

use serde::Serialize;

use crate::record::{ContactId, ContactRecord};

/// The aggregated view of one identity cluster: the primary's id, every
/// distinct email and phone number across the cluster (the primary's own
/// values first), and the ids of all subordinate records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedIdentity {
  pub primary_contact_id:    ContactId,
  pub emails:                Vec<String>,
  pub phone_numbers:         Vec<String>,
  pub secondary_contact_ids: Vec<ContactId>,
}

impl ConsolidatedIdentity {
  /// The view of a cluster containing only a just-created primary.
  pub fn of_single(record: &ContactRecord) -> Self {
    ConsolidatedIdentity {
      primary_contact_id:    record.id,
      emails:                record.email.iter().cloned().collect(),
      phone_numbers:         record.phone_number.iter().cloned().collect(),
      secondary_contact_ids: Vec::new(),
    }
  }

  /// Build the view from a cluster closure. `primary` must be a member of
  /// `cluster`; the remaining members may be in any order.
  pub fn from_cluster(primary: &ContactRecord, cluster: &[ContactRecord]) -> Self {
    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();

    // The primary's own values come first; the rest follow in cluster order,
    // deduplicated.
    let members = std::iter::once(primary)
      .chain(cluster.iter().filter(|r| r.id != primary.id));

    for record in members {
      if let Some(email) = &record.email
        && !emails.contains(email)
      {
        emails.push(email.clone());
      }
      if let Some(phone) = &record.phone_number
        && !phone_numbers.contains(phone)
      {
        phone_numbers.push(phone.clone());
      }
    }

    let secondary_contact_ids = cluster
      .iter()
      .filter(|r| r.id != primary.id)
      .map(|r| r.id)
      .collect();

    ConsolidatedIdentity {
      primary_contact_id: primary.id,
      emails,
      phone_numbers,
      secondary_contact_ids,
    }
  }
}
