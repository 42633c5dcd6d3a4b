use std::collections::HashMap;

use serde::Serialize;

use crate::models::{UserRating, WatchedMovie};

/// "My films" profile numbers derived from the watched list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProfileStats {
    pub total_watched: usize,
    pub average_rating: Option<f64>,
    pub favorite_genre: Option<String>,
    /// Count per rating, index 0 holds rating 1.
    pub distribution: [usize; UserRating::MAX as usize],
}

pub fn profile_stats(watched: &[WatchedMovie]) -> ProfileStats {
    let mut distribution = [0; UserRating::MAX as usize];
    for w in watched {
        distribution[usize::from(w.latest_rating.get()) - 1] += 1;
    }

    let average_rating = (!watched.is_empty()).then(|| {
        let sum: u32 = watched.iter().map(|w| u32::from(w.latest_rating.get())).sum();
        f64::from(sum) / watched.len() as f64
    });

    ProfileStats {
        total_watched: watched.len(),
        average_rating,
        favorite_genre: favorite_genre(watched),
        distribution,
    }
}

/// Most frequent genre; on a tie the one encountered first wins.
fn favorite_genre(watched: &[WatchedMovie]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, genre) in watched.iter().flat_map(|w| w.movie.genres.iter()).enumerate() {
        counts.entry(genre.as_str()).or_insert((0, order)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(genre, _)| genre.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::MovieRecord, testing::rating};

    fn watched(id: i64, genres: &[&str], value: i32) -> WatchedMovie {
        WatchedMovie {
            movie: MovieRecord::new(id, format!("Film {id}")).with_genres(genres.iter().copied()),
            latest_rating: rating(value),
            rated_at: jiff::Timestamp::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_empty_profile() {
        let stats = profile_stats(&[]);
        assert_eq!(stats.total_watched, 0);
        assert_eq!(stats.average_rating, None);
        assert_eq!(stats.favorite_genre, None);
        assert_eq!(stats.distribution, [0; 10]);
    }

    #[test]
    fn test_profile_numbers() {
        let list = vec![
            watched(1, &["Drama", "Music"], 8),
            watched(2, &["Action", "Drama"], 6),
            watched(3, &["Action"], 10),
            watched(4, &[], 8),
        ];

        let stats = profile_stats(&list);

        assert_eq!(stats.total_watched, 4);
        assert_eq!(stats.average_rating, Some(8.0));
        assert_eq!(stats.distribution[7], 2);
        assert_eq!(stats.distribution[5], 1);
        assert_eq!(stats.distribution[9], 1);
        // Drama and Action both appear twice; Drama is seen first
        assert_eq!(stats.favorite_genre.as_deref(), Some("Drama"));
    }
}
