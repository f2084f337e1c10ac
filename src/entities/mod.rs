// Entity Models
// "Identity persists, values change"
//
// - Cat: catalog entry with a stable numeric id and an append-only opinion log
// - CatRepository: the storage seam the rating core talks to

pub mod cat;
pub mod repository;

pub use cat::{Cat, Opinion};
pub use repository::{seed_default_cats, CatRepository, InMemoryCatRepository, DEFAULT_CATS};
