use std::{cmp::Ordering, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record::ImageRecord;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    UploadDate,
    Size,
    Filename,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uploaddate" | "upload_date" | "date" => Ok(SortField::UploadDate),
            "size" => Ok(SortField::Size),
            "filename" | "name" => Ok(SortField::Filename),
            _ => Err(format!("Unknown sort field {s}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            _ => Err(format!("Unknown sort order {s}")),
        }
    }
}

fn compare(a: &ImageRecord, b: &ImageRecord, field: SortField) -> Ordering {
    match field {
        SortField::UploadDate => a.upload_date.cmp(&b.upload_date),
        SortField::Size => a.size.cmp(&b.size),
        SortField::Filename => a
            .filename
            .to_lowercase()
            .cmp(&b.filename.to_lowercase()),
    }
}

/// Sort in place. The sort is stable in both directions, so records that
/// compare equal stay in insertion order.
pub fn sort_records(records: &mut [ImageRecord], field: SortField, order: SortOrder) {
    match order {
        SortOrder::Asc => records.sort_by(|a, b| compare(a, b, field)),
        SortOrder::Desc => records.sort_by(|a, b| compare(b, a, field)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-indexed
    pub page: u32,
    pub limit: u32,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            sort: SortField::default(),
            order: SortOrder::default(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32, sort: SortField, order: SortOrder) -> Self {
        PageRequest {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            sort,
            order,
        }
    }

    /// Sort `records` and cut out the requested page.
    pub fn apply(&self, mut records: Vec<ImageRecord>) -> Page<ImageRecord> {
        sort_records(&mut records, self.sort, self.order);
        paginate(records, self.page, self.limit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

pub fn paginate<T>(items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = items.len() as u64;
    let start = (page as u64 - 1) * limit as u64;
    let end = start + limit as u64;

    let data = items
        .into_iter()
        .skip(start as usize)
        .take(limit as usize)
        .collect();

    Page {
        data,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit as u64),
            has_next: end < total,
            has_prev: page > 1,
        },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeRange {
    /// Under 1 MiB
    Small,
    /// 1 to 5 MiB inclusive
    Medium,
    /// Over 5 MiB
    Large,
}

impl SizeRange {
    pub fn contains(&self, size: u64) -> bool {
        match self {
            SizeRange::Small => size < MIB,
            SizeRange::Medium => (MIB..=5 * MIB).contains(&size),
            SizeRange::Large => size > 5 * MIB,
        }
    }
}

impl FromStr for SizeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(SizeRange::Small),
            "medium" => Ok(SizeRange::Medium),
            "large" => Ok(SizeRange::Large),
            _ => Err(format!("Unknown size range {s}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    Today,
    Week,
    Month,
}

impl DateRange {
    pub fn max_age(&self) -> Duration {
        match self {
            DateRange::Today => Duration::days(1),
            DateRange::Week => Duration::days(7),
            DateRange::Month => Duration::days(30),
        }
    }

    pub fn contains(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(date) <= self.max_age()
    }
}

impl FromStr for DateRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "today" => Ok(DateRange::Today),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            _ => Err(format!("Unknown date range {s}")),
        }
    }
}

/// Optional predicates, combined with AND. An empty set matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_range: Option<SizeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl FilterSet {
    pub fn matches(&self, record: &ImageRecord, now: DateTime<Utc>) -> bool {
        if let Some(range) = self.size_range {
            if !range.contains(record.size) {
                return false;
            }
        }

        if let Some(range) = self.date_range {
            if !range.contains(record.upload_date, now) {
                return false;
            }
        }

        if let Some(category) = self.caption_category.as_deref() {
            let category = category.to_lowercase();
            if !record
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&category))
            {
                return false;
            }
        }

        if let Some(owner) = self.owner.as_deref() {
            if record.owner != owner {
                return false;
            }
        }

        true
    }
}

/// Case-insensitive substring match against the filename or any tag.
pub fn matches_search(record: &ImageRecord, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    record.filename.to_lowercase().contains(&query)
        || record
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(&query))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::record::test_util::record;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn pagination_boundaries() {
        let items = (0..25).collect::<Vec<_>>();

        let first = paginate(items.clone(), 1, 10);
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.pagination.total, 25);
        assert_eq!(first.pagination.total_pages, 3);
        assert!(first.pagination.has_next);
        assert!(!first.pagination.has_prev);

        let second = paginate(items.clone(), 2, 10);
        assert_eq!(second.data, (10..20).collect::<Vec<_>>());
        assert!(second.pagination.has_next);
        assert!(second.pagination.has_prev);

        let last = paginate(items.clone(), 3, 10);
        assert_eq!(last.data, (20..25).collect::<Vec<_>>());
        assert!(!last.pagination.has_next);
        assert!(last.pagination.has_prev);

        let past_end = paginate(items, 4, 10);
        assert!(past_end.data.is_empty());
        assert!(!past_end.pagination.has_next);
    }

    #[test]
    fn exact_multiple_fills_last_page() {
        let last = paginate((0..20).collect::<Vec<_>>(), 2, 10);
        assert_eq!(last.data.len(), 10);
        assert_eq!(last.pagination.total_pages, 2);
        assert!(!last.pagination.has_next);
    }

    #[test]
    fn empty_listing() {
        let page = paginate(Vec::<u32>::new(), 1, 10);
        assert_eq!(page.pagination.total, 0);
        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next);
        assert!(!page.pagination.has_prev);
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let page = paginate(vec![1], 1, 10);
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["pagination"]["totalPages"], 1);
        assert_eq!(value["pagination"]["hasNext"], false);
        assert_eq!(value["pagination"]["hasPrev"], false);
    }

    #[test]
    fn sort_is_stable_in_both_directions() {
        let a = record("u", "a.jpg", 100, at(1));
        let b = record("u", "b.jpg", 100, at(2));
        let c = record("u", "c.jpg", 50, at(3));

        let mut records = vec![a.clone(), b.clone(), c.clone()];
        sort_records(&mut records, SortField::Size, SortOrder::Desc);
        assert_eq!(records, vec![a.clone(), b.clone(), c.clone()]);

        sort_records(&mut records, SortField::Size, SortOrder::Asc);
        assert_eq!(records, vec![c, a, b]);
    }

    #[test]
    fn filename_sort_ignores_case() {
        let mut records = vec![
            record("u", "beta.png", 1, at(1)),
            record("u", "Alpha.png", 1, at(2)),
            record("u", "gamma.png", 1, at(3)),
        ];
        sort_records(&mut records, SortField::Filename, SortOrder::Asc);
        let names = records.iter().map(|r| r.filename.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Alpha.png", "beta.png", "gamma.png"]);
    }

    #[test]
    fn default_request_is_newest_first() {
        let records = vec![
            record("u", "old.png", 1, at(1)),
            record("u", "new.png", 1, at(5)),
        ];
        let page = PageRequest::default().apply(records);
        assert_eq!(page.data[0].filename, "new.png");
    }

    #[test]
    fn size_ranges() {
        assert!(SizeRange::Small.contains(MIB - 1));
        assert!(!SizeRange::Small.contains(MIB));
        assert!(SizeRange::Medium.contains(MIB));
        assert!(SizeRange::Medium.contains(5 * MIB));
        assert!(!SizeRange::Large.contains(5 * MIB));
        assert!(SizeRange::Large.contains(5 * MIB + 1));
    }

    #[test]
    fn date_ranges() {
        let now = at(20);
        assert!(DateRange::Today.contains(now - Duration::hours(23), now));
        assert!(!DateRange::Today.contains(now - Duration::hours(25), now));
        assert!(DateRange::Week.contains(now - Duration::days(7), now));
        assert!(!DateRange::Week.contains(now - Duration::days(8), now));
        assert!(DateRange::Month.contains(now - Duration::days(30), now));
    }

    #[test]
    fn filters_combine_with_and() {
        let now = at(20);
        let mut beach = record("alice", "beach.jpg", 2 * MIB, at(19));
        beach.tags = vec!["Sandy Beach".to_string(), "sea".to_string()];
        let mut city = record("alice", "city.jpg", 100, at(19));
        city.tags = vec!["street".to_string()];

        let filter = FilterSet {
            size_range: Some(SizeRange::Medium),
            caption_category: Some("beach".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&beach, now));
        assert!(!filter.matches(&city, now));

        let other_owner = FilterSet {
            owner: Some("bob".to_string()),
            ..Default::default()
        };
        assert!(!other_owner.matches(&beach, now));
        assert!(FilterSet::default().matches(&city, now));
    }

    #[test]
    fn search_matches_filename_or_tags() {
        let mut r = record("u", "Holiday-2023.JPG", 1, at(1));
        r.tags = vec!["Mountain".to_string()];
        assert!(matches_search(&r, "holiday"));
        assert!(matches_search(&r, "MOUNT"));
        assert!(!matches_search(&r, "beach"));
    }

    #[test]
    fn parse_query_values() {
        assert_eq!("uploadDate".parse::<SortField>().unwrap(), SortField::UploadDate);
        assert_eq!("SIZE".parse::<SortField>().unwrap(), SortField::Size);
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("sideways".parse::<SortOrder>().is_err());
        assert_eq!("Large".parse::<SizeRange>().unwrap(), SizeRange::Large);
        assert_eq!("week".parse::<DateRange>().unwrap(), DateRange::Week);
    }

    #[test]
    fn page_request_clamps() {
        let req = PageRequest::new(0, 1000, SortField::Size, SortOrder::Asc);
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_PAGE_SIZE);
    }
}
