// ⭐ Rating Coordinator - Validate, rate, remember
//
// Sits between a request and the catalog:
//   1. validate the stars
//   2. find the cat through the repository
//   3. rate it and save it back
//   4. fold the new average into the visitor's cookie

use crate::cookies::{self, CookieWriter};
use crate::entities::{Cat, CatRepository, Opinion};
use crate::error::{CatError, CatResult};
use tracing::info;

/// Lowest accepted rating is anything above this
pub const MIN_STARS_EXCLUSIVE: f64 = 0.0;

/// Highest accepted rating (inclusive)
pub const MAX_STARS: f64 = 5.0;

/// Accept iff 0 < stars <= 5 (NaN rejected)
pub fn validate_stars(stars: f64) -> CatResult<()> {
    if stars > MIN_STARS_EXCLUSIVE && stars <= MAX_STARS {
        Ok(())
    } else {
        Err(CatError::InvalidRating { stars })
    }
}

/// A cat's opinions as listed to one visitor
#[derive(Debug, Clone, PartialEq)]
pub struct VisitorView {
    pub opinions: Vec<Opinion>,
    pub rated: bool,
}

pub struct CatService<R: CatRepository> {
    repository: R,
}

impl<R: CatRepository> CatService<R> {
    pub fn new(repository: R) -> Self {
        CatService { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    // ========================================================================
    // RATING
    // ========================================================================

    /// Rate a cat in hand with an empty comment
    pub fn rate_cat(&self, stars: f64, cat: &mut Cat) -> CatResult<Cat> {
        validate_stars(stars)?;
        cat.rate(stars, "");
        Ok(cat.clone())
    }

    /// Look the cat up, rate it with `comment` and save it back
    pub fn rate_cat_by_id(&mut self, stars: f64, comment: &str, id: u64) -> CatResult<Cat> {
        validate_stars(stars)?;

        let mut cat = self
            .repository
            .find_by_id(id)?
            .ok_or(CatError::NotFound { id })?;

        cat.rate(stars, comment);
        self.repository.save(&cat)?;

        info!(
            cat_id = id,
            stars,
            average = cat.average_rate().unwrap_or(stars),
            "Cat rated"
        );

        Ok(cat)
    }

    /// Rate by id and write the updated cookie in one go.
    ///
    /// Nothing is written to `writer` unless the rating was stored.
    pub fn rate_and_remember<W: CookieWriter + ?Sized>(
        &mut self,
        stars: f64,
        comment: &str,
        id: u64,
        old_cookie: &str,
        writer: &mut W,
    ) -> CatResult<(Cat, String)> {
        let cat = self.rate_cat_by_id(stars, comment, id)?;
        let average = cat.average_rate().unwrap_or(stars);

        let cookie = cookies::update_cookies(old_cookie, cat.id, average, comment, writer);
        Ok((cat, cookie))
    }

    // ========================================================================
    // OPINIONS
    // ========================================================================

    pub fn get_opinions<'a>(&self, cat: &'a Cat) -> &'a [Opinion] {
        cat.opinions()
    }

    /// What one visitor sees of a cat: the recorded opinions, plus whether
    /// their cookie already holds a record for it.
    ///
    /// The cookie carries the cat's average, not the visitor's own stars, so
    /// it never contributes opinions here.
    pub fn view_for_visitor(&self, cat: &Cat, cookie: &str) -> VisitorView {
        VisitorView {
            opinions: cat.opinions().to_vec(),
            rated: cookies::is_entry_in_cookies(cat, cookie),
        }
    }

    // ========================================================================
    // CATALOG
    // ========================================================================

    pub fn find_all_cats(&self) -> CatResult<Vec<Cat>> {
        Ok(self.repository.find_all()?)
    }

    pub fn find_cat(&self, id: u64) -> CatResult<Cat> {
        self.repository
            .find_by_id(id)?
            .ok_or(CatError::NotFound { id })
    }

    pub fn create_cat(&mut self, name: &str, image: &str) -> CatResult<Cat> {
        Ok(self.repository.create(name, image)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
