//! Core domain types for bill ingestion.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Full text placeholder when the bill page was fetched but carried no text block.
pub const FULL_TEXT_NOT_AVAILABLE: &str = "Full bill text not available";

/// Full text placeholder when the bill page could not be fetched at all.
pub const FULL_TEXT_FETCH_FAILED: &str = "Failed to fetch full bill text";

/// Category assigned when no rule matches.
pub const FALLBACK_CATEGORY: &str = "Other";

// ---------------------------------------------------------------------------
// BillId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for stored bill identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(pub Uuid);

impl BillId {
    /// Generate a new time-sortable bill identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BillId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BillId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// FeedEntry
// ---------------------------------------------------------------------------

/// One item of the upstream feed, describing a bill's latest known state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Bill number (e.g. `HB1234`).
    pub title: String,
    /// Link to the bill's status page; carries the upstream `id` parameter.
    pub link: String,
    /// Session year the entry belongs to.
    pub session_year: String,
    /// Summary, possibly containing HTML markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// LSR title, used as summary when `description` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsr_title: Option<String>,
    /// Latest committee, recorded as the sponsor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_committee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub senate_status: Option<String>,
}

impl FeedEntry {
    /// Raw (HTML) summary: `description`, falling back to the LSR title.
    pub fn summary_html(&self) -> &str {
        self.description
            .as_deref()
            .or(self.lsr_title.as_deref())
            .unwrap_or("")
    }

    /// Sponsor string; empty when the feed has none.
    pub fn sponsor(&self) -> &str {
        self.latest_committee.as_deref().unwrap_or("")
    }

    /// Composite status string, `House: <status>, Senate: <status>`.
    pub fn status(&self) -> String {
        format!(
            "House: {}, Senate: {}",
            self.house_status.as_deref().unwrap_or(""),
            self.senate_status.as_deref().unwrap_or("")
        )
    }
}

// ---------------------------------------------------------------------------
// CandidateRecord
// ---------------------------------------------------------------------------

/// A fully enriched bill produced by one ingestion run, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Bill number; the unique business key.
    pub number: String,
    pub session_year: String,
    /// Plain-text summary (markup stripped).
    pub summary: String,
    pub sponsor: String,
    /// Composite house/senate status.
    pub status: String,
    /// Plain full text, or one of the full-text sentinels.
    pub full_text: String,
    /// Bill text page the full text was read from.
    pub html_link: String,
    pub category: String,
    /// Wall-clock time of enrichment.
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StoredBill and relations
// ---------------------------------------------------------------------------

/// An upcoming committee hearing for a bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hearing {
    pub committee: String,
    pub date: NaiveDate,
    pub time: String,
    pub location: String,
}

/// One action recorded in a bill's docket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocketEntry {
    pub date: NaiveDate,
    /// `House` or `Senate`.
    pub chamber: String,
    pub action: String,
}

/// The persisted representation of a bill, unique by `number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBill {
    /// Surrogate identity.
    pub id: BillId,
    pub number: String,
    pub session_year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub summary: String,
    pub sponsor: String,
    pub status: String,
    pub full_text: String,
    pub html_link: String,
    /// Unset until the first categorization pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docket_link: Option<String>,
    pub last_updated: DateTime<Utc>,
    /// At most one upcoming hearing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hearing: Option<Hearing>,
    /// Docket history, most recent first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docket_entries: Vec<DocketEntry>,
}

impl StoredBill {
    /// Build a new, not-yet-persisted bill from a candidate.
    pub fn from_candidate(candidate: CandidateRecord) -> Self {
        Self {
            id: BillId::new(),
            number: candidate.number,
            session_year: candidate.session_year,
            title: None,
            summary: candidate.summary,
            sponsor: candidate.sponsor,
            status: candidate.status,
            full_text: candidate.full_text,
            html_link: candidate.html_link,
            category: Some(candidate.category),
            docket_link: None,
            last_updated: candidate.last_updated,
            next_hearing: None,
            docket_entries: Vec::new(),
        }
    }

    /// Overwrite every candidate-backed field with the candidate's value.
    ///
    /// Empty strings in the candidate replace stored values; nothing is merged.
    pub fn apply_candidate(&mut self, candidate: CandidateRecord) {
        self.number = candidate.number;
        self.session_year = candidate.session_year;
        self.summary = candidate.summary;
        self.sponsor = candidate.sponsor;
        self.status = candidate.status;
        self.full_text = candidate.full_text;
        self.html_link = candidate.html_link;
        self.category = Some(candidate.category);
        self.last_updated = candidate.last_updated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(number: &str, sponsor: &str) -> CandidateRecord {
        CandidateRecord {
            number: number.into(),
            session_year: "2024".into(),
            summary: "relative to school funding".into(),
            sponsor: sponsor.into(),
            status: "House: Passed, Senate: ".into(),
            full_text: FULL_TEXT_NOT_AVAILABLE.into(),
            html_link: "https://example.com/bill?id=1".into(),
            category: "Education".into(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn bill_id_roundtrip() {
        let id = BillId::new();
        let parsed: BillId = id.to_string().parse().expect("parse BillId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn feed_entry_status_composite() {
        let entry = FeedEntry {
            house_status: Some("Passed".into()),
            ..FeedEntry::default()
        };
        assert_eq!(entry.status(), "House: Passed, Senate: ");
    }

    #[test]
    fn feed_entry_summary_falls_back_to_lsr_title() {
        let mut entry = FeedEntry {
            lsr_title: Some("relative to roads".into()),
            ..FeedEntry::default()
        };
        assert_eq!(entry.summary_html(), "relative to roads");

        entry.description = Some("<p>relative to bridges</p>".into());
        assert_eq!(entry.summary_html(), "<p>relative to bridges</p>");
    }

    #[test]
    fn apply_candidate_overwrites_with_empty_values() {
        let mut stored = StoredBill::from_candidate(candidate("HB1", "A"));
        let id = stored.id.clone();
        stored.title = Some("Kept title".into());

        stored.apply_candidate(candidate("HB1", ""));

        assert_eq!(stored.sponsor, "");
        assert_eq!(stored.id, id);
        assert_eq!(stored.title.as_deref(), Some("Kept title"));
    }

    #[test]
    fn stored_bill_serialization() {
        let mut bill = StoredBill::from_candidate(candidate("SB7", "Finance"));
        bill.docket_entries.push(DocketEntry {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            chamber: "Senate".into(),
            action: "Introduced".into(),
        });

        let json = serde_json::to_string(&bill).expect("serialize");
        let parsed: StoredBill = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.number, "SB7");
        assert_eq!(parsed.docket_entries.len(), 1);
        assert!(parsed.next_hearing.is_none());
    }
}
