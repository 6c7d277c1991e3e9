pub mod movie;
pub mod user;

pub use movie::{
    genre_id, genre_names_from_ids, normalize_genre, CanonicalMovie, MovieRef, TmdbCredits,
    TmdbGenre, TmdbMovie, TmdbMovieDetails, TmdbPaged,
};
pub use user::{DailyQuota, GenreBuckets, HistoryEntry, Preferences, User, HISTORY_LIMIT};
