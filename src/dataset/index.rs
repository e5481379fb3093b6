//! In-memory sorted/indexed catalog built from a joined title set
//! (spec §4.5 "Indexing", §3 "Indices").
//!
//! All index lists share `Arc<Title>` references into one canonical
//! set rather than cloning rows per index, mirroring spec §3's
//! invariant that "all indices reference the same joined-title
//! records."

use std::collections::HashMap;
use std::sync::Arc;

use super::model::{Title, TitleType};

/// One fully-built, immutable generation of the dataset. A refresh
/// produces a new `DatasetIndex` and swaps it in atomically; this
/// type itself never mutates after construction (spec §3 "a dataset
/// refresh atomically swaps the entire index set").
pub struct DatasetIndex {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub unrecognized_type_count: u64,
    by_type: HashMap<TitleType, Vec<Arc<Title>>>,
    by_type_genre: HashMap<(TitleType, String), Vec<Arc<Title>>>,
    by_decade: HashMap<u16, Vec<Arc<Title>>>,
    total_titles: usize,
}

fn sort_key(t: &Title) -> (std::cmp::Reverse<OrderedF32>, std::cmp::Reverse<u64>) {
    (std::cmp::Reverse(OrderedF32(t.rating)), std::cmp::Reverse(t.votes))
}

/// `f32` wrapper with a total order for sorting; ratings are never
/// `NaN` in this dataset (parsed from a numeric TSV column), so this
/// only needs to be total enough for `sort_by_key`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedF32(f32);

impl Eq for OrderedF32 {}

impl PartialOrd for OrderedF32 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF32 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

impl DatasetIndex {
    /// Build a fresh index generation from a joined title set.
    /// Adult titles are excluded from every index (spec §4.5 "Adult
    /// titles are excluded from primary indices") but the count of
    /// unrecognized-type rows is carried through for observability.
    pub fn build(titles: Vec<Title>, unrecognized_type_count: u64) -> Self {
        let titles: Vec<Arc<Title>> = titles.into_iter().filter(|t| !t.is_adult).map(Arc::new).collect();
        let total_titles = titles.len();

        let mut by_type: HashMap<TitleType, Vec<Arc<Title>>> = HashMap::new();
        let mut by_type_genre: HashMap<(TitleType, String), Vec<Arc<Title>>> = HashMap::new();
        let mut by_decade: HashMap<u16, Vec<Arc<Title>>> = HashMap::new();

        for title in &titles {
            by_type.entry(title.title_type).or_default().push(Arc::clone(title));
            for genre in &title.genres {
                by_type_genre
                    .entry((title.title_type, genre.clone()))
                    .or_default()
                    .push(Arc::clone(title));
            }
            if let Some(decade) = title.decade() {
                by_decade.entry(decade).or_default().push(Arc::clone(title));
            }
        }

        for list in by_type.values_mut() {
            list.sort_by_key(|t| sort_key(t));
        }
        for list in by_type_genre.values_mut() {
            list.sort_by_key(|t| sort_key(t));
        }
        for list in by_decade.values_mut() {
            list.sort_by_key(|t| sort_key(t));
        }

        Self {
            generated_at: chrono::Utc::now(),
            unrecognized_type_count,
            by_type,
            by_type_genre,
            by_decade,
            total_titles,
        }
    }

    pub fn empty() -> Self {
        Self {
            generated_at: chrono::Utc::now(),
            unrecognized_type_count: 0,
            by_type: HashMap::new(),
            by_type_genre: HashMap::new(),
            by_decade: HashMap::new(),
            total_titles: 0,
        }
    }

    pub fn total_titles(&self) -> usize {
        self.total_titles
    }

    /// The base list a query draws from, before year/rating/vote
    /// filters are applied: per-(type, genre) if a genre was
    /// requested, otherwise per-type.
    pub(super) fn base_list(&self, title_type: TitleType, genre: Option<&str>) -> &[Arc<Title>] {
        match genre {
            Some(g) => self
                .by_type_genre
                .get(&(title_type, g.to_string()))
                .map(|v| v.as_slice())
                .unwrap_or(&[]),
            None => self.by_type.get(&title_type).map(|v| v.as_slice()).unwrap_or(&[]),
        }
    }

    #[cfg(test)]
    pub(super) fn decade_list(&self, decade: u16) -> &[Arc<Title>] {
        self.by_decade.get(&decade).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(id: &str, rating: f32, votes: u64, genres: &[&str], year: u16) -> Title {
        Title {
            id: id.to_string(),
            title_type: TitleType::Movie,
            title: id.to_string(),
            start_year: Some(year),
            end_year: None,
            runtime_minutes: Some(100),
            genres: genres.iter().map(|s| s.to_string()).collect(),
            is_adult: false,
            rating,
            votes,
        }
    }

    #[test]
    fn sorts_by_rating_then_votes_descending() {
        let titles = vec![
            title("a", 7.0, 100, &["Drama"], 1990),
            title("b", 9.0, 50, &["Drama"], 1990),
            title("c", 9.0, 500, &["Drama"], 1990),
        ];
        let idx = DatasetIndex::build(titles, 0);
        let ids: Vec<&str> = idx.base_list(TitleType::Movie, None).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn excludes_adult_titles_from_indices() {
        let mut adult = title("x", 9.9, 9999, &["Drama"], 1990);
        adult.is_adult = true;
        let idx = DatasetIndex::build(vec![adult], 0);
        assert_eq!(idx.base_list(TitleType::Movie, None).len(), 0);
        assert_eq!(idx.total_titles(), 0);
    }

    #[test]
    fn buckets_by_decade() {
        let idx = DatasetIndex::build(vec![title("a", 8.0, 100, &[], 1994)], 0);
        assert_eq!(idx.decade_list(1990).len(), 1);
        assert_eq!(idx.decade_list(1980).len(), 0);
    }

    #[test]
    fn genre_list_shares_records_with_type_list() {
        let idx = DatasetIndex::build(vec![title("a", 8.0, 100, &["Drama", "Crime"], 1994)], 0);
        assert_eq!(idx.base_list(TitleType::Movie, Some("Drama")).len(), 1);
        assert_eq!(idx.base_list(TitleType::Movie, Some("Crime")).len(), 1);
        assert_eq!(idx.base_list(TitleType::Movie, Some("Comedy")).len(), 0);
    }
}
