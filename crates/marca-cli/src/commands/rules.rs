//! Rules command - manage template rule sets.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use marca_core::models::rules::DEFAULT_RENDER_SCALE;
use marca_core::{FieldRule, JsonRuleStore, MarkedRegion, RuleSet, RuleSetStore, StoreError};

use super::{load_config, parse_rect, OutputFormat, RectArg};

/// Arguments for the rules command.
#[derive(Args)]
pub struct RulesArgs {
    /// Rule set directory (default: storage.rules_dir from the config)
    #[arg(long, global = true)]
    rules_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: RulesCommand,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List templates with a stored rule set
    List,

    /// Show the rule set of a template
    Show {
        /// Template identifier
        template: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Add or replace the rule for a field
    Add(AddArgs),

    /// Remove the rule for a field
    Remove {
        /// Template identifier
        template: String,
        /// Field name
        field: String,
    },

    /// Delete a template's rule set
    Delete {
        /// Template identifier
        template: String,
    },

    /// Check every rule of a template
    Validate {
        /// Template identifier
        template: String,
    },
}

#[derive(Args)]
struct AddArgs {
    /// Template identifier
    template: String,

    /// Field name
    field: String,

    /// Page the region is on (1-indexed)
    #[arg(short, long, default_value = "1")]
    page: u32,

    /// Relative region as x,y,width,height
    #[arg(short, long, value_parser = parse_rect)]
    rect: RectArg,

    /// Page count of the template (required for a new rule set)
    #[arg(long)]
    page_count: Option<u32>,

    /// Display name of the template
    #[arg(long)]
    name: Option<String>,

    /// Render scale the region was drawn at
    #[arg(long, default_value_t = DEFAULT_RENDER_SCALE)]
    scale: f32,
}

pub async fn run(args: RulesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let dir = args.rules_dir.unwrap_or(config.storage.rules_dir);
    let mut store = JsonRuleStore::new(dir);

    match args.command {
        RulesCommand::List => list(&store),
        RulesCommand::Show { template, format } => show(&store, &template, format),
        RulesCommand::Add(add_args) => add(&mut store, add_args),
        RulesCommand::Remove { template, field } => remove(&mut store, &template, &field),
        RulesCommand::Delete { template } => {
            store.delete(&template)?;
            println!("{} Deleted rule set {}", style("✓").green(), template);
            Ok(())
        }
        RulesCommand::Validate { template } => validate(&store, &template),
    }
}

fn list(store: &JsonRuleStore) -> anyhow::Result<()> {
    let templates = store.list_templates()?;
    if templates.is_empty() {
        println!("No rule sets in {}", store.dir().display());
        return Ok(());
    }

    for template in templates {
        let rule_set = store.load(&template)?;
        println!(
            "{:<20} {:>3} rules  {:>2} pages  {}",
            style(&template).bold(),
            rule_set.rules.len(),
            rule_set.page_count,
            rule_set.name.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

fn show(store: &JsonRuleStore, template: &str, format: OutputFormat) -> anyhow::Result<()> {
    let rule_set = store.load(template)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rule_set)?),
        OutputFormat::Text => {
            println!(
                "Template: {}{}",
                rule_set.template_id,
                rule_set
                    .name
                    .as_deref()
                    .map(|n| format!(" ({n})"))
                    .unwrap_or_default()
            );
            println!("Pages: {}", rule_set.page_count);
            if let Some(updated) = rule_set.updated_at {
                println!("Updated: {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!();
            for rule in &rule_set.rules {
                let r = &rule.region;
                println!(
                    "  {:<20} page {}  x={:.4} y={:.4} w={:.4} h={:.4}",
                    rule.field_name, r.page_number, r.x, r.y, r.width, r.height
                );
            }
        }
    }

    Ok(())
}

fn add(store: &mut JsonRuleStore, args: AddArgs) -> anyhow::Result<()> {
    let mut rule_set = match store.load(&args.template) {
        Ok(existing) => existing,
        Err(StoreError::NotFound(_)) => {
            let page_count = args.page_count.ok_or_else(|| {
                anyhow::anyhow!(
                    "Template {} has no rule set yet; pass --page-count to create one",
                    args.template
                )
            })?;
            info!("Creating rule set for {}", args.template);
            RuleSet::new(args.template.clone(), page_count)
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(page_count) = args.page_count {
        rule_set.page_count = page_count;
    }
    if let Some(name) = args.name {
        rule_set.name = Some(name);
    }

    let region = MarkedRegion::new(
        args.field.clone(),
        args.page,
        args.rect.x,
        args.rect.y,
        args.rect.width,
        args.rect.height,
    )
    .with_render_scale(args.scale);
    let rule = FieldRule::new(region);
    rule.validate(rule_set.page_count)?;

    rule_set.add_rule(rule);
    store.save(&rule_set)?;

    println!(
        "{} Saved rule {} for template {}",
        style("✓").green(),
        args.field,
        args.template
    );

    Ok(())
}

fn remove(store: &mut JsonRuleStore, template: &str, field: &str) -> anyhow::Result<()> {
    let mut rule_set = store.load(template)?;
    if !rule_set.remove_rule(field) {
        anyhow::bail!("Template {} has no rule for field {}", template, field);
    }
    store.save(&rule_set)?;

    println!("{} Removed rule {} from {}", style("✓").green(), field, template);
    Ok(())
}

fn validate(store: &JsonRuleStore, template: &str) -> anyhow::Result<()> {
    let validated = store.load(template)?.validate();

    for rule in &validated.rules {
        println!("  {} {}", style("✓").green(), rule.field_name);
    }
    for error in &validated.errors {
        println!("  {} {}", style("✗").red(), error);
    }

    if !validated.is_clean() {
        anyhow::bail!(
            "{} of {} rules are invalid",
            validated.errors.len(),
            validated.errors.len() + validated.rules.len()
        );
    }

    println!("{} All rules valid", style("✓").green());
    Ok(())
}
