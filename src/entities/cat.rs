// 🐱 Cat Entity - Catalog entries that visitors rate
//
// "The id is IDENTITY (assigned once by the repository), the opinions are VALUES"
//
// - id never changes after the repository hands it out
// - opinions are append-only, in the order they were given
// - average_rate is always the mean of the recorded opinions

use serde::{Deserialize, Serialize};

// ============================================================================
// OPINION
// ============================================================================

/// One rating event: stars plus a (possibly empty) comment.
///
/// Immutable once created. Two opinions are equal when both fields match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    stars: f64,
    comment: String,
}

impl Opinion {
    pub fn new(stars: f64, comment: impl Into<String>) -> Self {
        Opinion {
            stars,
            comment: comment.into(),
        }
    }

    pub fn stars(&self) -> f64 {
        self.stars
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

// ============================================================================
// CAT ENTITY
// ============================================================================

/// Catalog entry
///
/// Identity: numeric id (assigned by the repository)
/// Values: name, image
/// Aggregate: opinions + running average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cat {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    /// Stable identifier, `0` until a repository assigns one
    pub id: u64,

    // ========================================================================
    // VALUES
    // ========================================================================
    /// Display name (e.g., "Bella")
    pub name: String,

    /// Image reference (e.g., "bella.png")
    pub image: String,

    // ========================================================================
    // AGGREGATE (only changed through `rate`)
    // ========================================================================
    average_rate: Option<f64>,
    opinions: Vec<Opinion>,
}

impl Cat {
    /// Create a cat that has not been stored yet (id 0)
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self::with_id(0, name, image)
    }

    /// Create a cat with a known identifier
    pub fn with_id(id: u64, name: impl Into<String>, image: impl Into<String>) -> Self {
        Cat {
            id,
            name: name.into(),
            image: image.into(),
            average_rate: None,
            opinions: Vec::new(),
        }
    }

    /// Rebuild a cat from persisted opinions, recomputing the average
    pub fn restore(
        id: u64,
        name: impl Into<String>,
        image: impl Into<String>,
        opinions: Vec<Opinion>,
    ) -> Self {
        let mut cat = Self::with_id(id, name, image);
        cat.opinions = opinions;
        cat.recompute_average();
        cat
    }

    /// Append an opinion and recompute the average rating.
    ///
    /// No range check here; callers validate stars first.
    pub fn rate(&mut self, stars: f64, comment: impl Into<String>) {
        self.opinions.push(Opinion::new(stars, comment));
        self.recompute_average();
    }

    fn recompute_average(&mut self) {
        if self.opinions.is_empty() {
            self.average_rate = None;
            return;
        }

        let total: f64 = self.opinions.iter().map(Opinion::stars).sum();
        self.average_rate = Some(total / self.opinions.len() as f64);
    }

    /// Mean of all recorded stars, `None` if never rated
    pub fn average_rate(&self) -> Option<f64> {
        self.average_rate
    }

    /// Opinions in the order they were recorded
    pub fn opinions(&self) -> &[Opinion] {
        &self.opinions
    }

    pub fn rating_count(&self) -> usize {
        self.opinions.len()
    }

    pub fn is_rated(&self) -> bool {
        !self.opinions.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
