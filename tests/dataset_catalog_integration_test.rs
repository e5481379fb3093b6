// Integration tests for building a dataset index from joined title
// rows and querying it the way the addon-protocol routes do.

#[cfg(test)]
mod dataset_catalog_integration_tests {
    use catalog_addon_core::dataset::{DatasetIndex, DatasetQuery, Title, TitleType};

    fn title(
        id: &str,
        title_type: TitleType,
        rating: f32,
        votes: u64,
        year: u16,
        genres: &[&str],
        is_adult: bool,
    ) -> Title {
        Title {
            id: id.to_string(),
            title_type,
            title: id.to_string(),
            start_year: Some(year),
            end_year: None,
            runtime_minutes: Some(100),
            genres: genres.iter().map(|s| s.to_string()).collect(),
            is_adult,
            rating,
            votes,
        }
    }

    #[test]
    fn full_catalog_build_and_query_workflow() {
        let titles = vec![
            title("tt1", TitleType::Movie, 8.8, 2_000_000, 2010, &["Sci-Fi", "Drama"], false),
            title("tt2", TitleType::Movie, 7.2, 50_000, 2010, &["Comedy"], false),
            title("tt3", TitleType::Movie, 9.1, 10_000, 1999, &["Drama"], false),
            title("tt4", TitleType::Series, 8.5, 300_000, 2015, &["Drama"], false),
            title("tt5", TitleType::Movie, 9.9, 9_999, 2010, &["Drama"], true), // adult, excluded
            title("tt6", TitleType::Short, 6.0, 500, 2010, &[], false),
        ];

        let index = DatasetIndex::build(titles, 2);
        assert_eq!(index.total_titles(), 5); // tt5 excluded for is_adult
        assert_eq!(index.unrecognized_type_count, 2);

        // Genre-scoped, rating-and-votes sorted query over movies.
        let drama_query = DatasetQuery { genre: Some("Drama".to_string()), ..Default::default() };
        let page = catalog_addon_core::dataset::run_query(&index, TitleType::Movie, &drama_query);
        assert_eq!(page.total, 2);
        // tt1 outranks tt3 on votes despite tt3's higher rating margin
        // only mattering when votes tie — sort is (rating desc, votes desc).
        assert_eq!(page.items[0].id, "tt3");
        assert_eq!(page.items[1].id, "tt1");

        // Year-range filter narrows further.
        let recent_drama = DatasetQuery {
            genre: Some("Drama".to_string()),
            year_min: Some(2005),
            ..Default::default()
        };
        let page = catalog_addon_core::dataset::run_query(&index, TitleType::Movie, &recent_drama);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "tt1");

        // Series and shorts are indexed independently of movies.
        let series_query = DatasetQuery::default();
        let page = catalog_addon_core::dataset::run_query(&index, TitleType::Series, &series_query);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "tt4");

        let short_query = DatasetQuery::default();
        let page = catalog_addon_core::dataset::run_query(&index, TitleType::Short, &short_query);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "tt6");

        // Pagination over the full movie list.
        let paged = DatasetQuery { skip: 1, limit: 2, ..Default::default() };
        let page = catalog_addon_core::dataset::run_query(&index, TitleType::Movie, &paged);
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
    }
}
