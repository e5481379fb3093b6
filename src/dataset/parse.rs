//! Streaming download, decompression, and join of the two gzipped TSV
//! archives (spec §4.5 "Refresh cycle").
//!
//! Grounded on `database::backup`'s use of `flate2::read::GzDecoder`
//! over a `Read`, generalized from a whole-file decompress into a
//! line-at-a-time scan: each row is parsed, consumed, and dropped
//! before the next is read, so the process never holds more than one
//! row plus the in-progress ratings map in memory at a time.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};

use flate2::read::GzDecoder;

use super::error::DatasetError;
use super::model::{Title, TitleType};

/// Per-title rating and vote count, keyed by the external title id.
/// Built first so the basics scan can join against it without ever
/// holding the ratings file's rows.
pub type RatingsMap = HashMap<String, (f32, u64)>;

/// Download a gzip-compressed resource. Decompression and parsing
/// happen downstream in a blocking task — this only owns the network
/// round-trip.
pub async fn download(client: &reqwest::Client, url: &str, label: &'static str) -> Result<Vec<u8>, DatasetError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| DatasetError::Download(label, e.to_string()))?;
    let resp = resp
        .error_for_status()
        .map_err(|e| DatasetError::Download(label, e.to_string()))?;
    resp.bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| DatasetError::Download(label, e.to_string()))
}

/// Parse the ratings TSV into a lookup map, dropping any title below
/// `min_votes` (spec §4.5 "filtering out sub-threshold titles").
pub fn parse_ratings(gz_bytes: &[u8], min_votes: u64) -> Result<RatingsMap, DatasetError> {
    let reader = BufReader::new(GzDecoder::new(gz_bytes));
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| DatasetError::Decompress("ratings", "empty stream".into()))?
        .map_err(|e| DatasetError::Decompress("ratings", e.to_string()))?;
    let cols = Columns::new(&header, "ratings", &["tconst", "averageRating", "numVotes"])?;

    let mut map = RatingsMap::new();
    for (lineno, line) in lines.enumerate() {
        let line = line.map_err(|e| DatasetError::Decompress("ratings", e.to_string()))?;
        let fields: Vec<&str> = line.split('\t').collect();
        let id = cols.get(&fields, "tconst", "ratings", lineno)?;
        let rating: f32 = cols
            .get(&fields, "averageRating", "ratings", lineno)?
            .parse()
            .map_err(|_| DatasetError::MalformedRow("ratings", lineno, "bad averageRating".into()))?;
        let votes: u64 = cols
            .get(&fields, "numVotes", "ratings", lineno)?
            .parse()
            .map_err(|_| DatasetError::MalformedRow("ratings", lineno, "bad numVotes".into()))?;

        if votes < min_votes {
            continue;
        }
        map.insert(id.to_string(), (rating, votes));
    }

    Ok(map)
}

/// Scan the basics TSV, joining each row against `ratings` and
/// emitting a [`Title`] for every recognized, sufficiently-voted
/// title (spec §4.5 "a scan of the basics stream joined against the
/// map"). Returns the joined titles plus a count of rows skipped for
/// an unrecognized `titleType` (counted but not emitted).
pub fn parse_and_join_basics(gz_bytes: &[u8], ratings: &RatingsMap) -> Result<(Vec<Title>, u64), DatasetError> {
    let reader = BufReader::new(GzDecoder::new(gz_bytes));
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| DatasetError::Decompress("basics", "empty stream".into()))?
        .map_err(|e| DatasetError::Decompress("basics", e.to_string()))?;
    let cols = Columns::new(
        &header,
        "basics",
        &[
            "tconst",
            "titleType",
            "primaryTitle",
            "isAdult",
            "startYear",
            "endYear",
            "runtimeMinutes",
            "genres",
        ],
    )?;

    let mut titles = Vec::new();
    let mut unrecognized = 0u64;

    for (lineno, line) in lines.enumerate() {
        let line = line.map_err(|e| DatasetError::Decompress("basics", e.to_string()))?;
        let fields: Vec<&str> = line.split('\t').collect();

        let id = cols.get(&fields, "tconst", "basics", lineno)?;
        let Some((rating, votes)) = ratings.get(id) else {
            continue;
        };

        let raw_type = cols.get(&fields, "titleType", "basics", lineno)?;
        let Some(title_type) = TitleType::from_raw(raw_type) else {
            unrecognized += 1;
            continue;
        };

        let title = cols.get(&fields, "primaryTitle", "basics", lineno)?.to_string();
        let is_adult = cols.get(&fields, "isAdult", "basics", lineno)? == "1";
        let start_year = parse_optional_u16(cols.get(&fields, "startYear", "basics", lineno)?);
        let end_year = parse_optional_u16(cols.get(&fields, "endYear", "basics", lineno)?);
        let runtime_minutes = parse_optional_u32(cols.get(&fields, "runtimeMinutes", "basics", lineno)?);
        let genres = parse_genres(cols.get(&fields, "genres", "basics", lineno)?);

        titles.push(Title {
            id: id.to_string(),
            title_type,
            title,
            start_year,
            end_year,
            runtime_minutes,
            genres,
            is_adult,
            rating: *rating,
            votes: *votes,
        });
    }

    Ok((titles, unrecognized))
}

fn parse_optional_u16(raw: &str) -> Option<u16> {
    if raw == r"\N" || raw.is_empty() {
        None
    } else {
        raw.parse().ok()
    }
}

fn parse_optional_u32(raw: &str) -> Option<u32> {
    if raw == r"\N" || raw.is_empty() {
        None
    } else {
        raw.parse().ok()
    }
}

fn parse_genres(raw: &str) -> Vec<String> {
    if raw == r"\N" || raw.is_empty() {
        Vec::new()
    } else {
        raw.split(',').map(|s| s.trim().to_string()).collect()
    }
}

/// Resolves column names to positions once per file, so each row
/// indexes by name without re-scanning the header.
struct Columns {
    positions: HashMap<&'static str, usize>,
}

impl Columns {
    fn new(header: &str, label: &'static str, required: &[&'static str]) -> Result<Self, DatasetError> {
        let header_fields: Vec<&str> = header.split('\t').collect();
        let mut positions = HashMap::new();
        for &name in required {
            let pos = header_fields
                .iter()
                .position(|f| *f == name)
                .ok_or(DatasetError::MissingColumn(name, label))?;
            positions.insert(name, pos);
        }
        Ok(Self { positions })
    }

    fn get<'a>(
        &self,
        fields: &[&'a str],
        name: &'static str,
        label: &'static str,
        lineno: usize,
    ) -> Result<&'a str, DatasetError> {
        let pos = self.positions[name];
        fields
            .get(pos)
            .copied()
            .ok_or_else(|| DatasetError::MalformedRow(label, lineno, format!("missing column {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn parses_ratings_and_filters_sub_threshold() {
        let tsv = "tconst\taverageRating\tnumVotes\ntt1\t8.5\t100\ntt2\t9.0\t5\n";
        let map = parse_ratings(&gzip(tsv), 10).unwrap();
        assert!(map.contains_key("tt1"));
        assert!(!map.contains_key("tt2"));
    }

    #[test]
    fn joins_basics_against_ratings_and_counts_unrecognized() {
        let ratings = {
            let tsv = "tconst\taverageRating\tnumVotes\ntt1\t8.5\t500\ntt2\t7.0\t500\n";
            parse_ratings(&gzip(tsv), 10).unwrap()
        };
        let basics_tsv = "tconst\ttitleType\tprimaryTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
                           tt1\tmovie\tExample\t0\t1999\t\\N\t120\tDrama,Thriller\n\
                           tt2\tvideoGame\tNotATitle\t0\t2001\t\\N\t\\N\t\\N\n\
                           tt3\tmovie\tNoRatingRow\t0\t2001\t\\N\t90\tComedy\n";
        let (titles, unrecognized) = parse_and_join_basics(&gzip(basics_tsv), &ratings).unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].id, "tt1");
        assert_eq!(titles[0].genres, vec!["Drama".to_string(), "Thriller".to_string()]);
        assert_eq!(unrecognized, 1);
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let tsv = "tconst\tnumVotes\ntt1\t500\n";
        let err = parse_ratings(&gzip(tsv), 10).unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn("averageRating", "ratings")));
    }
}
