// Rate My Cat - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod cookies;
pub mod db;
pub mod entities;
pub mod error;
pub mod service;

// Re-export commonly used types
pub use config::Config;
pub use cookies::{
    cookie_from_header, format_record, is_entry_in_cookies, is_opinion_in_cookies,
    parse_records, update_cookies, update_opinions_with_cookie_value, value_for_entry,
    CookieRecord, CookieWriter, CAT_TERMINATOR, COOKIE_NAME, FIELD_SEPARATOR,
};
pub use db::{
    cat_activity, count_cats, import_catalog, load_catalog_csv, log_activity, setup_database,
    Activity, ActivityKind, CatalogRow, SqliteCatRepository,
};
pub use entities::{
    seed_default_cats, Cat, CatRepository, InMemoryCatRepository, Opinion, DEFAULT_CATS,
};
pub use error::{CatError, CatResult};
pub use service::{validate_stars, CatService, VisitorView, MAX_STARS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
