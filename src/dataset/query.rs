//! Paginated reads against a single dataset generation (spec §4.5
//! "Queries").

use std::sync::Arc;

use super::index::DatasetIndex;
use super::model::{Title, TitleType};

#[derive(Debug, Clone, Default)]
pub struct DatasetQuery {
    pub genre: Option<String>,
    pub year_min: Option<u16>,
    pub year_max: Option<u16>,
    pub min_rating: Option<f32>,
    pub min_votes: Option<u64>,
    pub skip: usize,
    pub limit: usize,
}

pub struct Page {
    pub items: Vec<Arc<Title>>,
    pub total: usize,
}

/// Run `query` against `index`'s per-(type, genre) or per-type list,
/// applying the remaining filters in list order, then slice out one
/// page. Callers hold `index` as a snapshot reference for the
/// duration of the call, so a concurrent refresh never changes the
/// result mid-query (spec §4.5 "A query seen during an active refresh
/// completes against the pre-swap dataset").
pub fn run(index: &DatasetIndex, title_type: TitleType, query: &DatasetQuery) -> Page {
    let candidates = index.base_list(title_type, query.genre.as_deref());

    let filtered: Vec<Arc<Title>> = candidates
        .iter()
        .filter(|t| matches(t, query))
        .cloned()
        .collect();

    let total = filtered.len();
    let limit = if query.limit == 0 { total } else { query.limit };
    let items = filtered.into_iter().skip(query.skip).take(limit).collect();

    Page { items, total }
}

fn matches(title: &Title, query: &DatasetQuery) -> bool {
    if let Some(min) = query.year_min {
        if title.start_year.map(|y| y < min).unwrap_or(true) {
            return false;
        }
    }
    if let Some(max) = query.year_max {
        if title.start_year.map(|y| y > max).unwrap_or(true) {
            return false;
        }
    }
    if let Some(min_rating) = query.min_rating {
        if title.rating < min_rating {
            return false;
        }
    }
    if let Some(min_votes) = query.min_votes {
        if title.votes < min_votes {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(id: &str, rating: f32, votes: u64, year: u16) -> crate::dataset::model::Title {
        crate::dataset::model::Title {
            id: id.to_string(),
            title_type: TitleType::Movie,
            title: id.to_string(),
            start_year: Some(year),
            end_year: None,
            runtime_minutes: Some(100),
            genres: vec!["Drama".to_string()],
            is_adult: false,
            rating,
            votes,
        }
    }

    #[test]
    fn paginates_and_reports_total() {
        let titles = vec![
            title("a", 9.0, 100, 2000),
            title("b", 8.5, 100, 2001),
            title("c", 8.0, 100, 2002),
        ];
        let idx = DatasetIndex::build(titles, 0);
        let q = DatasetQuery { skip: 1, limit: 1, ..Default::default() };
        let page = run(&idx, TitleType::Movie, &q);
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "b");
    }

    #[test]
    fn filters_by_year_range_and_min_rating() {
        let titles = vec![title("a", 9.0, 100, 1990), title("b", 5.0, 100, 2010)];
        let idx = DatasetIndex::build(titles, 0);
        let q = DatasetQuery { year_min: Some(2000), min_rating: Some(6.0), ..Default::default() };
        let page = run(&idx, TitleType::Movie, &q);
        assert_eq!(page.total, 0);

        let q2 = DatasetQuery { year_min: Some(1980), min_rating: Some(6.0), ..Default::default() };
        let page2 = run(&idx, TitleType::Movie, &q2);
        assert_eq!(page2.total, 1);
        assert_eq!(page2.items[0].id, "a");
    }
}
