//! Template inspection command.

use console::style;

use formscrape::config::Config;
use formscrape::FieldKind;

/// Validate the configured template and list its fields.
pub fn cmd_template(config: &Config) -> anyhow::Result<()> {
    let catalog = config.load_catalog()?;
    let (width, height) = catalog.required_page_size();

    println!(
        "\n{} {}",
        style(catalog.name()).bold(),
        catalog
            .revision()
            .map(|r| format!("(revision {})", r))
            .unwrap_or_default()
    );
    println!(
        "{} fields, needs a page of at least {}x{} px",
        catalog.len(),
        width,
        height
    );
    println!("{}", "-".repeat(70));

    for region in &catalog {
        let kind = match region.kind {
            FieldKind::Text => style(region.kind.as_str()).cyan(),
            FieldKind::Checkbox => style(region.kind.as_str()).magenta(),
        };
        println!("  {:<45} {:<10} {}", region.id, kind, region.rect);
    }

    Ok(())
}
