use crate::cache::TaskCache;
use crate::cli::{CacheAction, CacheArgs};

pub async fn execute(args: CacheArgs) -> anyhow::Result<()> {
    let config = super::load_config(&args.config.config, None)?;
    let cache = TaskCache::load(&config.cache.path, config.cache.max_entries);

    match args.action {
        CacheAction::Stats => {
            let stats = cache.stats().await;
            println!("Cache file: {}", config.cache.path.display());
            println!("Enabled:    {}", config.cache.enabled);
            println!("Entries:    {}/{}", stats.entries, stats.max_entries);
        }
        CacheAction::Clear => {
            let removed = cache.len().await;
            cache.clear().await;
            cache.save().await?;
            println!("Removed {} cached result(s)", removed);
        }
    }
    Ok(())
}
