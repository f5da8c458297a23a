//! `aloc list`, `aloc show`, and `aloc domains`: read-only views of the
//! fingerprint store.

use adaptive_locator_core::store::FingerprintStore;
use anyhow::{bail, Result};

use crate::config::Config;
use crate::locate::open_store;

pub fn run_domains(config: &Config) -> Result<()> {
    let store = open_store(config);
    let domains = store.domains();
    if domains.is_empty() {
        println!("No fingerprints stored in {}.", store.dir().display());
        return Ok(());
    }
    println!("{:<32} LOCATORS", "DOMAIN");
    for d in &domains {
        println!("{:<32} {}", d, store.list(d).len());
    }
    Ok(())
}

/// List locator keys for one domain, or for every domain when unset.
pub fn run_list(config: &Config, domain: Option<&str>) -> Result<()> {
    let store = open_store(config);
    let domains = match domain {
        Some(d) => vec![config.engine_options().aliases.resolve(d).to_string()],
        None => store.domains(),
    };

    let mut printed = false;
    for d in &domains {
        let records = store.load(d);
        for (locator, record) in &records.records {
            if !printed {
                println!("{:<24} {:<20} {:<8} {:<8} LOCATOR", "DOMAIN", "SAVED", "TAG", "HISTORY");
                printed = true;
            }
            println!(
                "{:<24} {:<20} {:<8} {:<8} {}",
                d,
                record.latest.saved_at().format("%Y-%m-%dT%H:%M:%SZ"),
                record.latest.tag(),
                record.history.len(),
                locator
            );
        }
    }
    if !printed {
        println!("No fingerprints.");
    }
    Ok(())
}

/// Print the stored fingerprint for `locator` as JSON.
pub fn run_show(config: &Config, domain: &str, locator: &str, history: bool) -> Result<()> {
    let store = open_store(config);
    let domain = config.engine_options().aliases.resolve(domain).to_string();
    let mut records = store.load(&domain);
    let Some(record) = records.records.remove(locator) else {
        bail!("No fingerprint for '{}' in domain {}", locator, domain);
    };

    if history {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&record.latest)?);
    }
    Ok(())
}
