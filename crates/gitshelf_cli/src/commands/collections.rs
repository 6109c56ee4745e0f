//! Collections command implementation.

use gitshelf_access::{ApiConfig, PolicyRegistry};
use std::path::Path;
use tracing::info;

/// Runs the collections command.
pub async fn run(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Listing collections at {:?}", root);
    let config = ApiConfig::load(root).await?;
    let registry = PolicyRegistry::from_config(&config)?;

    println!("Collections at {:?}", root);
    println!();

    for (name, options) in config.collection_options() {
        println!("{}", name);
        println!("  Identifier:  {}", options.id);
        println!(
            "  Schema:      {}",
            if options.schema.is_some() { "yes" } else { "no" }
        );

        if !options.attachments.is_empty() {
            let attachments: Vec<String> = options
                .attachments
                .iter()
                .map(|(field, spec)| format!("{} (.{})", field, spec.extension()))
                .collect();
            println!("  Attachments: {}", attachments.join(", "));
        }

        let exposed = registry
            .collection(&name)
            .map(|policy| {
                policy
                    .operations()
                    .iter()
                    .map(|op| op.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        println!(
            "  Operations:  {}",
            if exposed.is_empty() { "none" } else { &exposed }
        );
        println!();
    }

    if let Some(authenticator) = registry.authenticator() {
        println!(
            "Authentication: {} via {}",
            authenticator.collection(),
            authenticator.strategy_names().join(", ")
        );
    } else {
        println!("Authentication: none");
    }

    Ok(())
}
