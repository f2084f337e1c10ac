use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

use rate_my_cat::{
    import_catalog, load_catalog_csv, seed_default_cats, CatRepository, CatService, Config,
    SqliteCatRepository,
};

const USAGE: &str = "usage:
  rate-my-cat import <catalog.csv>
  rate-my-cat seed
  rate-my-cat list [--cookie <value>]
  rate-my-cat rate <id> <stars> [comment] [--cookie <value>]";

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (args, cookie) = split_cookie_flag(args)?;

    let config = Config::load()?;
    let repository = SqliteCatRepository::open(&config.database_path)?.with_actor("cli");
    let mut service = CatService::new(repository);

    match args.first().map(String::as_str) {
        Some("import") => {
            let path = args.get(1).context("import needs a CSV path")?;
            run_import(&mut service, Path::new(path))
        }
        Some("seed") => run_seed(&mut service),
        Some("list") | None => run_list(&service, &cookie),
        Some("rate") => {
            let id: u64 = args
                .get(1)
                .context("rate needs a cat id")?
                .parse()
                .context("cat id must be a non-negative integer")?;
            let stars: f64 = args
                .get(2)
                .context("rate needs a number of stars")?
                .parse()
                .context("stars must be a number")?;
            let comment = args.get(3).map(String::as_str).unwrap_or("");
            run_rate(&mut service, id, stars, comment, &cookie)
        }
        Some(other) => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

/// Pull `--cookie <value>` out of the argument list
fn split_cookie_flag(args: Vec<String>) -> Result<(Vec<String>, String)> {
    let mut rest = Vec::new();
    let mut cookie = String::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if arg == "--cookie" {
            cookie = iter.next().context("--cookie needs a value")?;
        } else {
            rest.push(arg);
        }
    }

    Ok((rest, cookie))
}

fn run_import(service: &mut CatService<SqliteCatRepository>, csv_path: &Path) -> Result<()> {
    println!("📂 Loading catalog from {}...", csv_path.display());
    let rows = load_catalog_csv(csv_path)?;
    println!("✓ Read {} rows", rows.len());

    let inserted = import_catalog(service.repository_mut(), &rows)?;
    println!("✓ Inserted: {} cats", inserted);
    println!("✓ Skipped duplicates: {}", rows.len() - inserted);

    Ok(())
}

fn run_seed(service: &mut CatService<SqliteCatRepository>) -> Result<()> {
    if !service.repository().find_all()?.is_empty() {
        println!("✓ Catalog already has cats, nothing to seed");
        return Ok(());
    }

    let seeded = seed_default_cats(service.repository_mut())?;
    println!("✓ Seeded {} cats", seeded);

    Ok(())
}

fn run_list(service: &CatService<SqliteCatRepository>, cookie: &str) -> Result<()> {
    let cats = service.find_all_cats()?;

    if cats.is_empty() {
        println!("No cats yet. Run: rate-my-cat seed");
        return Ok(());
    }

    for cat in &cats {
        let average = cat
            .average_rate()
            .map(|a| format!("{:.1}★", a))
            .unwrap_or_else(|| "unrated".to_string());
        let view = service.view_for_visitor(cat, cookie);
        let mark = if view.rated { " (rated by you)" } else { "" };

        println!("[{}] {} ({}) - {}{}", cat.id, cat.name, cat.image, average, mark);

        for opinion in &view.opinions {
            if opinion.comment().is_empty() {
                println!("      {:.1}★", opinion.stars());
            } else {
                println!("      {:.1}★ \"{}\"", opinion.stars(), opinion.comment());
            }
        }
    }

    Ok(())
}

fn run_rate(
    service: &mut CatService<SqliteCatRepository>,
    id: u64,
    stars: f64,
    comment: &str,
    cookie: &str,
) -> Result<()> {
    let mut written: Vec<(String, String)> = Vec::new();

    let (cat, _) = service.rate_and_remember(stars, comment, id, cookie, &mut written)?;

    println!(
        "✓ Rated {} with {:.1}★ (average {:.1}★ over {} ratings)",
        cat.name,
        stars,
        cat.average_rate().unwrap_or(stars),
        cat.rating_count()
    );
    for (name, value) in written {
        println!("Set-Cookie: {}={}", name, value);
    }

    Ok(())
}
