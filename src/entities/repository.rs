// 📚 Cat Repository - Where catalog entries live
//
// The rating core only needs four things from storage: look a cat up by id,
// list them, create one (the repository owns the id sequence) and save one
// back after it was rated. `CatRepository` is that seam.
//
// - InMemoryCatRepository: Vec-backed, used by tests and quick demos
// - db::SqliteCatRepository: the persistent one

use super::cat::Cat;
use anyhow::{anyhow, Result};
use std::sync::{Arc, RwLock};

// ============================================================================
// REPOSITORY TRAIT
// ============================================================================

pub trait CatRepository {
    /// Find a cat by its identifier
    fn find_by_id(&self, id: u64) -> Result<Option<Cat>>;

    /// All cats, ordered by id
    fn find_all(&self) -> Result<Vec<Cat>>;

    /// Store a new cat, assigning the next id from the repository's sequence
    fn create(&mut self, name: &str, image: &str) -> Result<Cat>;

    /// Persist the current state of an existing cat (opinions included)
    fn save(&mut self, cat: &Cat) -> Result<()>;
}

/// Default catalog: (name, image)
pub const DEFAULT_CATS: &[(&str, &str)] = &[
    ("Baby", "baby.png"),
    ("Bella", "bella.png"),
    ("Dolly", "dolly.png"),
    ("Duke", "duke.png"),
    ("Fluffy", "fluffy.png"),
    ("Honey", "honey.png"),
    ("Kitty", "kitty.png"),
    ("Laika", "laika.png"),
    ("Lucky", "lucky.png"),
    ("Milo", "milo.png"),
    ("Shadow", "shadow.png"),
    ("Simba", "simba.png"),
];

/// Create the default catalog in any repository. Returns how many were added.
pub fn seed_default_cats<R: CatRepository + ?Sized>(repository: &mut R) -> Result<usize> {
    for (name, image) in DEFAULT_CATS {
        repository.create(name, image)?;
    }
    Ok(DEFAULT_CATS.len())
}

// ============================================================================
// IN-MEMORY REPOSITORY
// ============================================================================

/// Vec-backed repository. Ids start at 0 and increase by one per `create`.
#[derive(Clone, Default)]
pub struct InMemoryCatRepository {
    cats: Arc<RwLock<Vec<Cat>>>,
    next_id: Arc<RwLock<u64>>,
}

impl InMemoryCatRepository {
    /// Create new empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create repository with the default catalog pre-loaded
    pub fn with_defaults() -> Result<Self> {
        let mut repository = Self::new();
        seed_default_cats(&mut repository)?;
        Ok(repository)
    }

    /// Insert a cat as-is, keeping its id. The sequence moves past it.
    pub fn insert(&mut self, cat: Cat) -> Result<()> {
        let mut next_id = self.next_id.write().map_err(|_| poisoned())?;
        let mut cats = self.cats.write().map_err(|_| poisoned())?;

        *next_id = (*next_id).max(cat.id.saturating_add(1));
        cats.retain(|c| c.id != cat.id);
        cats.push(cat);
        cats.sort_by_key(|c| c.id);

        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.cats.read().map_err(|_| poisoned())?.len())
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("cat repository lock poisoned")
}

impl CatRepository for InMemoryCatRepository {
    fn find_by_id(&self, id: u64) -> Result<Option<Cat>> {
        let cats = self.cats.read().map_err(|_| poisoned())?;
        Ok(cats.iter().find(|c| c.id == id).cloned())
    }

    fn find_all(&self) -> Result<Vec<Cat>> {
        let cats = self.cats.read().map_err(|_| poisoned())?;
        Ok(cats.clone())
    }

    fn create(&mut self, name: &str, image: &str) -> Result<Cat> {
        let mut next_id = self.next_id.write().map_err(|_| poisoned())?;
        if *next_id == u64::MAX {
            return Err(anyhow!("Cat id sequence exhausted"));
        }
        let cat = Cat::with_id(*next_id, name, image);
        *next_id += 1;

        self.cats.write().map_err(|_| poisoned())?.push(cat.clone());
        Ok(cat)
    }

    fn save(&mut self, cat: &Cat) -> Result<()> {
        let mut cats = self.cats.write().map_err(|_| poisoned())?;
        let slot = cats
            .iter_mut()
            .find(|c| c.id == cat.id)
            .ok_or_else(|| anyhow!("Cat not found: {}", cat.id))?;
        *slot = cat.clone();
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
