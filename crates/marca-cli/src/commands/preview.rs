//! Preview command - extract the text under one region.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use marca_core::batch::judge;
use marca_core::models::rules::DEFAULT_RENDER_SCALE;
use marca_core::{
    ExtractionResult, JsonRuleStore, MarkedRegion, PdfDocument, RegionExtractor, RenderContext,
    RuleSetStore, TextLayer, Verdict,
};

use super::{load_config, parse_rect, parse_size, OutputFormat, RectArg};

/// Arguments for the preview command.
#[derive(Args)]
pub struct PreviewArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Page number (1-indexed)
    #[arg(short, long, default_value = "1")]
    page: u32,

    /// Relative region as x,y,width,height
    #[arg(short, long, value_parser = parse_rect, required_unless_present = "template")]
    rect: Option<RectArg>,

    /// Use the stored rule of this template instead of --rect (needs --field)
    #[arg(short, long, requires = "field", conflicts_with = "rect")]
    template: Option<String>,

    /// Field name, selects vocabulary and the stored rule
    #[arg(long)]
    field: Option<String>,

    /// Canvas size the page is rendered at, as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    rendered: Option<(f32, f32)>,

    /// Render scale when no canvas size is given
    #[arg(long, default_value_t = DEFAULT_RENDER_SCALE)]
    scale: f32,

    /// List the matched fragments
    #[arg(long)]
    fragments: bool,

    /// Rule set directory (default: storage.rules_dir from the config)
    #[arg(long)]
    rules_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct FragmentView {
    text: String,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Serialize)]
struct PreviewOutput {
    #[serde(flatten)]
    result: ExtractionResult,
    verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    fragments: Option<Vec<FragmentView>>,
}

pub async fn run(args: PreviewArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let region = resolve_region(&args, &config.storage.rules_dir)?;
    info!("Previewing {} on page {}", region.field_name, region.page_number);

    let data = fs::read(&args.input)?;
    let document = PdfDocument::load(&data)?;
    if region.page_number == 0 || region.page_number > document.page_count() {
        anyhow::bail!(
            "Page {} out of range, document has {} pages",
            region.page_number,
            document.page_count()
        );
    }
    let page = document.page(region.page_number)?;
    if !page.has_text() {
        eprintln!(
            "{} Page {} has no text layer; scanned pages need OCR first.",
            style("⚠").yellow(),
            page.number
        );
    }

    let extractor = RegionExtractor::new(&config)?;
    let ctx = match args.rendered {
        Some((width, height)) => RenderContext::for_canvas(&page, width, height),
        None => RenderContext::for_page(&page, region.render_scale),
    };

    let result = extractor.extract(&region, &page, &ctx)?;
    let verdict = judge(extractor.vocabulary(), &region.field_name, &result.cleaned_text);

    let fragments = if args.fragments {
        Some(
            extractor
                .matched_fragments(&region, &page, &ctx)?
                .into_iter()
                .map(|f| FragmentView {
                    text: f.text.clone(),
                    x: f.native_x,
                    y: f.native_y,
                    width: f.approx_width,
                    height: f.approx_height,
                })
                .collect(),
        )
    } else {
        None
    };

    let output = PreviewOutput {
        result,
        verdict,
        fragments,
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => print_text(&output),
    }

    Ok(())
}

fn resolve_region(args: &PreviewArgs, default_rules_dir: &std::path::Path) -> anyhow::Result<MarkedRegion> {
    let field = args.field.clone().unwrap_or_else(|| "PREVIEW".to_string());

    if let Some(template) = &args.template {
        let dir = args.rules_dir.clone().unwrap_or_else(|| default_rules_dir.to_path_buf());
        let rule_set = JsonRuleStore::new(dir).load(template)?;
        let rule = rule_set
            .rule(&field)
            .ok_or_else(|| anyhow::anyhow!("Template {} has no rule for field {}", template, field))?;
        return Ok(rule.region.clone());
    }

    let rect = args
        .rect
        .ok_or_else(|| anyhow::anyhow!("Either --rect or --template is required"))?;
    let region = MarkedRegion::new(field, args.page, rect.x, rect.y, rect.width, rect.height)
        .with_render_scale(args.scale);
    if !region.has_area() {
        anyhow::bail!("Region has no area");
    }
    Ok(region)
}

fn print_text(output: &PreviewOutput) {
    let result = &output.result;
    let status = if output.verdict.is_accepted() {
        style("accepted").green()
    } else {
        style("rejected").red()
    };

    println!("Field:   {}", result.field_name);
    println!("Raw:     {}", result.raw_text);
    println!("Cleaned: {}", result.cleaned_text);
    println!(
        "Match:   {} ({} fragments)",
        result.tier.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string()),
        result.fragment_count
    );
    println!("Verdict: {} ({:?})", status, output.verdict);

    if let Some(fragments) = &output.fragments {
        println!();
        for f in fragments {
            println!(
                "  {:>8.2} {:>8.2}  {:>6.2}x{:<6.2} {}",
                f.x, f.y, f.width, f.height, f.text
            );
        }
    }
}
