//! Decides which fetched changes are new for one (subscriber, repository).

use repowatch_core::{ChangeRecord, NoticeLabel, Watermark};

/// One change selected for delivery, with the label it is announced under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub label: NoticeLabel,
    pub record: ChangeRecord,
}

/// Select the changes to deliver, in delivery order.
///
/// Records are first sorted by `(timestamp, revision)` and exact duplicates
/// dropped, since adapter order is not trusted.
///
/// - `Seen(w)`: every record strictly after `w`, oldest first, labelled `New`.
/// - `Unseen`: the newest `replay_cap` records, newest first, labelled
///   `Last`. A cap of zero means no cap beyond what was fetched.
///
/// The first entry of the plan is therefore always the one whose timestamp
/// the watermark moves to under the first-delivered rule: the oldest unseen
/// change in steady state, the newest change on replay.
pub fn plan_deliveries(
    mut records: Vec<ChangeRecord>,
    watermark: Watermark,
    replay_cap: usize,
) -> Vec<Delivery> {
    records.sort_by(ChangeRecord::chronological);
    records.dedup_by(|a, b| a.order_key() == b.order_key());

    let label = watermark.label();
    let wrap = |record| Delivery { label, record };

    match watermark {
        Watermark::Seen(_) => records
            .into_iter()
            .filter(|r| watermark.admits(r.timestamp))
            .map(wrap)
            .collect(),
        Watermark::Unseen => {
            let cap = if replay_cap == 0 { records.len() } else { replay_cap };
            records.into_iter().rev().take(cap).map(wrap).collect()
        }
    }
}
