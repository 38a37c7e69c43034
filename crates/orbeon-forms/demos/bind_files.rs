//! Bind a form data file against its definition and print the values as JSON.
//!
//! ```text
//! cargo run -p orbeon-forms --example bind_files -- form.xhtml data.xml [locale [fallback...]]
//! ```

use std::env;

use anyhow::{bail, Context, Result};
use orbeon_forms::{CompileOptions, DecoderRegistry, Runner};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [definition, instance, locales @ ..] = args.as_slice() else {
        bail!("usage: bind_files <definition.xml> <data.xml> [locale [fallback...]]");
    };
    let options = match locales {
        [] => CompileOptions::new("en"),
        [locale, fallbacks @ ..] => {
            CompileOptions::new(locale.as_str()).with_fallbacks(fallbacks.iter().cloned())
        }
    };

    let runner = Runner::from_definition_file(definition, &options, DecoderRegistry::new())
        .with_context(|| format!("compiling {definition}"))?;
    let form = runner
        .bind_file(instance)
        .with_context(|| format!("binding {instance}"))?;

    for control in runner.schema().controls() {
        let label = control.label.as_deref().unwrap_or("-");
        println!("{:<24} {:<16} {}", control.normalized_name, control.type_tag, label);
    }
    println!("{}", serde_json::to_string_pretty(&form.to_json()?)?);
    Ok(())
}
