use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// The durable, deduplicated movie metadata record.
///
/// Created on first resolution of a title through the metadata cache and never
/// deleted. The metadata cache subsystem is the sole writer; everything else
/// only reads. The release year is always derived from `release_date`, never
/// stored on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalMovie {
    /// External metadata id (TMDB movie id)
    pub tmdb_id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    /// Lowercased canonical genre names
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub cast: Vec<String>,
}

impl CanonicalMovie {
    pub fn year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }
}

/// Minimal denormalized projection of a `CanonicalMovie`, stored inline in
/// user preference buckets so prompt construction never needs a join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRef {
    pub movie_id: i64,
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl From<&CanonicalMovie> for MovieRef {
    fn from(movie: &CanonicalMovie) -> Self {
        Self {
            movie_id: movie.tmdb_id,
            title: movie.title.clone(),
            genres: movie.genres.clone(),
        }
    }
}

// ============================================================================
// Genre id mapping
// ============================================================================

/// TMDB numeric genre-category id → canonical lowercase genre name.
///
/// Unrecognized ids are dropped by `genre_names_from_ids` (logged, not errored).
pub fn genre_name(id: i64) -> Option<&'static str> {
    match id {
        28 => Some("action"),
        12 => Some("adventure"),
        16 => Some("animation"),
        35 => Some("comedy"),
        80 => Some("crime"),
        99 => Some("documentary"),
        18 => Some("drama"),
        10751 => Some("family"),
        14 => Some("fantasy"),
        36 => Some("history"),
        27 => Some("horror"),
        10402 => Some("music"),
        9648 => Some("mystery"),
        10749 => Some("romance"),
        878 => Some("science fiction"),
        10770 => Some("tv movie"),
        53 => Some("thriller"),
        10752 => Some("war"),
        37 => Some("western"),
        _ => None,
    }
}

/// Reverse mapping used when building discover-by-genre provider queries.
pub fn genre_id(name: &str) -> Option<i64> {
    match name.to_lowercase().as_str() {
        "action" => Some(28),
        "adventure" => Some(12),
        "animation" => Some(16),
        "comedy" => Some(35),
        "crime" => Some(80),
        "documentary" => Some(99),
        "drama" => Some(18),
        "family" => Some(10751),
        "fantasy" => Some(14),
        "history" => Some(36),
        "horror" => Some(27),
        "music" => Some(10402),
        "mystery" => Some(9648),
        "romance" => Some(10749),
        "science fiction" | "sci-fi" | "scifi" => Some(878),
        "tv movie" => Some(10770),
        "thriller" => Some(53),
        "war" => Some(10752),
        "western" => Some(37),
        _ => None,
    }
}

/// Maps externally-sourced numeric genre ids to canonical names, silently
/// dropping anything unrecognized.
pub fn genre_names_from_ids(ids: &[i64]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| match genre_name(*id) {
            Some(name) => Some(name.to_string()),
            None => {
                tracing::debug!(genre_id = id, "Dropping unrecognized genre id");
                None
            }
        })
        .collect()
}

/// Genre keys are always lowercase canonical strings.
pub fn normalize_genre(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Paged results envelope returned by TMDB list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbPaged<T> {
    pub page: u32,
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

/// TMDB search / discover / trending list item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    /// TMDB returns "" for unknown dates, so this stays a raw string here
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
}

impl TmdbMovie {
    pub fn release_year(&self) -> Option<i32> {
        let date = self.release_date.as_deref()?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .map(|d| d.year())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbGenre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbCastMember {
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbCrewMember {
    pub name: String,
    #[serde(default)]
    pub job: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
    #[serde(default)]
    pub crew: Vec<TmdbCrewMember>,
}

/// TMDB get-by-id detail record (with `append_to_response=credits`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovieDetails {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub credits: Option<TmdbCredits>,
}

/// Maximum cast members carried into the canonical record
const CAST_LIMIT: usize = 10;

impl From<TmdbMovieDetails> for CanonicalMovie {
    fn from(details: TmdbMovieDetails) -> Self {
        let release_date = details
            .release_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        let genres = details
            .genres
            .iter()
            .map(|g| normalize_genre(&g.name))
            .collect();

        let (director, cast) = match details.credits {
            Some(credits) => {
                let director = credits
                    .crew
                    .iter()
                    .find(|c| c.job.as_deref() == Some("Director"))
                    .map(|c| c.name.clone());
                let cast = credits
                    .cast
                    .into_iter()
                    .take(CAST_LIMIT)
                    .map(|c| c.name)
                    .collect();
                (director, cast)
            }
            None => (None, Vec::new()),
        };

        CanonicalMovie {
            tmdb_id: details.id,
            title: details.title,
            overview: details.overview,
            release_date,
            genres,
            rating: details.vote_average,
            vote_count: details.vote_count,
            popularity: details.popularity,
            poster_path: details.poster_path,
            backdrop_path: details.backdrop_path,
            runtime: details.runtime,
            director,
            cast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_name_known_ids() {
        assert_eq!(genre_name(28), Some("action"));
        assert_eq!(genre_name(35), Some("comedy"));
        assert_eq!(genre_name(878), Some("science fiction"));
    }

    #[test]
    fn test_genre_name_unknown_id() {
        assert_eq!(genre_name(424242), None);
    }

    #[test]
    fn test_genre_names_from_ids_drops_unknown() {
        let names = genre_names_from_ids(&[28, 424242, 18]);
        assert_eq!(names, vec!["action".to_string(), "drama".to_string()]);
    }

    #[test]
    fn test_genre_id_round_trip() {
        for id in [28, 12, 16, 35, 80, 99, 18, 10751, 14, 36, 27] {
            let name = genre_name(id).unwrap();
            assert_eq!(genre_id(name), Some(id));
        }
    }

    #[test]
    fn test_normalize_genre() {
        assert_eq!(normalize_genre("  Science Fiction "), "science fiction");
    }

    #[test]
    fn test_details_to_canonical_movie() {
        let json = r#"{
            "id": 27205,
            "title": "Inception",
            "overview": "A thief who steals corporate secrets",
            "release_date": "2010-07-15",
            "genres": [{"id": 28, "name": "Action"}, {"id": 878, "name": "Science Fiction"}],
            "runtime": 148,
            "vote_average": 8.4,
            "vote_count": 34000,
            "popularity": 90.5,
            "poster_path": "/poster.jpg",
            "credits": {
                "cast": [{"name": "Leonardo DiCaprio"}, {"name": "Elliot Page"}],
                "crew": [
                    {"name": "Emma Thomas", "job": "Producer"},
                    {"name": "Christopher Nolan", "job": "Director"}
                ]
            }
        }"#;

        let details: TmdbMovieDetails = serde_json::from_str(json).unwrap();
        let movie: CanonicalMovie = details.into();

        assert_eq!(movie.tmdb_id, 27205);
        assert_eq!(movie.year(), Some(2010));
        assert_eq!(movie.genres, vec!["action", "science fiction"]);
        assert_eq!(movie.director, Some("Christopher Nolan".to_string()));
        assert_eq!(movie.cast.len(), 2);
        assert_eq!(movie.runtime, Some(148));
    }

    #[test]
    fn test_details_without_credits() {
        let json = r#"{"id": 1, "title": "Bare", "vote_average": 5.0}"#;
        let details: TmdbMovieDetails = serde_json::from_str(json).unwrap();
        let movie: CanonicalMovie = details.into();

        assert_eq!(movie.director, None);
        assert!(movie.cast.is_empty());
        assert_eq!(movie.year(), None);
    }

    #[test]
    fn test_listing_release_year_empty_date() {
        let json = r#"{"id": 1, "title": "Unknown", "release_date": ""}"#;
        let listing: TmdbMovie = serde_json::from_str(json).unwrap();
        assert_eq!(listing.release_year(), None);
    }

    #[test]
    fn test_movie_ref_from_canonical() {
        let json = r#"{
            "id": 27205,
            "title": "Inception",
            "release_date": "2010-07-15",
            "genres": [{"id": 878, "name": "Science Fiction"}]
        }"#;
        let movie: CanonicalMovie = serde_json::from_str::<TmdbMovieDetails>(json)
            .unwrap()
            .into();
        let mref = MovieRef::from(&movie);

        assert_eq!(mref.movie_id, 27205);
        assert_eq!(mref.title, "Inception");
        assert_eq!(mref.genres, vec!["science fiction"]);
    }
}
