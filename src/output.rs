//! Output formatting for scan jobs

use crate::error::{Error, Result};
use crate::model::{AssetFinding, Exposure, JobSummary, ScanJob, ScanStatus};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL,
};
use std::io::Write;
use std::str::FromStr;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table output
    #[default]
    Human,
    /// JSON output
    Json,
    /// No output (silent mode)
    None,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidOutputFormat(s.to_string())),
        }
    }
}

/// Sort order for plugin/theme rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSort {
    /// Type (Theme, Plugin), then slug (default)
    #[default]
    Name,
    /// Most vulnerabilities first, then type, then slug
    Vulns,
}

impl FromStr for OutputSort {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "vulns" => Ok(Self::Vulns),
            _ => Err(Error::InvalidOutputSort(s.to_string())),
        }
    }
}

/// Configuration for output formatting
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Sort order
    pub sort: OutputSort,
}

impl OutputConfig {
    /// Create a new output config
    pub fn new(format: OutputFormat, sort: OutputSort) -> Self {
        Self { format, sort }
    }
}

/// Output a single scan job
pub fn output_job<W: Write>(job: &ScanJob, config: &OutputConfig, writer: &mut W) -> Result<()> {
    match config.format {
        OutputFormat::Human => output_human(job, config, writer),
        OutputFormat::Json => output_json(job, writer),
        OutputFormat::None => Ok(()),
    }
}

/// Output the job listing
pub fn output_jobs<W: Write>(
    jobs: &[JobSummary],
    config: &OutputConfig,
    writer: &mut W,
) -> Result<()> {
    match config.format {
        OutputFormat::Json => output_json(jobs, writer),
        OutputFormat::None => Ok(()),
        OutputFormat::Human => {
            let mut table = new_table(&["Id", "Date", "Status", "URL"]);
            for job in jobs {
                table.add_row(vec![
                    Cell::new(job.id),
                    Cell::new(job.scan_date.format("%Y-%m-%d %H:%M:%S UTC")),
                    status_cell(job.status),
                    Cell::new(&job.url),
                ]);
            }
            writeln!(writer, "{}", table).map_err(Error::OutputFailed)
        }
    }
}

/// Output JSON format
fn output_json<W: Write, T: serde::Serialize + ?Sized>(value: &T, writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer).map_err(Error::OutputFailed)?;
    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

/// Output human-readable table format
fn output_human<W: Write>(job: &ScanJob, config: &OutputConfig, writer: &mut W) -> Result<()> {
    let mut summary = new_table(&["Scan", ""]);
    summary.add_row(vec![Cell::new("Id"), Cell::new(job.id)]);
    summary.add_row(vec![Cell::new("URL"), Cell::new(&job.url)]);
    summary.add_row(vec![
        Cell::new("Date"),
        Cell::new(job.scan_date.format("%Y-%m-%d %H:%M:%S UTC")),
    ]);
    summary.add_row(vec![Cell::new("Status"), status_cell(job.status)]);
    summary.add_row(vec![
        Cell::new("WordPress"),
        Cell::new(job.wordpress_version.as_deref().unwrap_or("-")),
    ]);
    summary.add_row(vec![
        Cell::new("Users"),
        Cell::new(if job.users.is_empty() {
            "-".to_string()
        } else {
            job.users.join(", ")
        }),
    ]);
    writeln!(writer, "{}", summary).map_err(Error::OutputFailed)?;

    let mut exposures = new_table(&["Check", "Result"]);
    for exposure in Exposure::ALL {
        let cell = if job.exposures.get(exposure) {
            Cell::new("Exposed").fg(Color::Red)
        } else {
            Cell::new("Ok").fg(Color::Green)
        };
        exposures.add_row(vec![
            Cell::new(exposure.to_string()),
            cell.set_alignment(CellAlignment::Center),
        ]);
    }
    writeln!(writer, "{}", exposures).map_err(Error::OutputFailed)?;

    let mut components: Vec<(&str, &String, &AssetFinding)> = job
        .themes
        .iter()
        .map(|(slug, f)| ("Theme", slug, f))
        .chain(job.plugins.iter().map(|(slug, f)| ("Plugin", slug, f)))
        .collect();

    match config.sort {
        // Already grouped by type and ordered by slug
        OutputSort::Name => {}
        OutputSort::Vulns => {
            components.sort_by(|a, b| {
                b.2.vulnerabilities
                    .len()
                    .cmp(&a.2.vulnerabilities.len())
                    .then_with(|| a.0.cmp(b.0).reverse())
                    .then_with(|| a.1.cmp(b.1))
            });
        }
    }

    let mut assets = new_table(&["Type", "Name", "Installed", "Latest", "Vulns"]);
    if components.is_empty() {
        assets.add_row(vec!["-", "-", "-", "-", "-"]);
    }
    for (kind, slug, finding) in &components {
        add_component_row(&mut assets, kind, slug, finding);
    }
    writeln!(writer, "{}", assets).map_err(Error::OutputFailed)?;

    let mut vulns = new_table(&["Component", "Title", "Type", "Fixed in", "CVE"]);
    let core = job
        .wordpress_vulnerabilities
        .iter()
        .map(|v| ("WordPress".to_string(), v));
    let per_asset = components.iter().flat_map(|(_, slug, finding)| {
        finding
            .vulnerabilities
            .iter()
            .map(move |v| (slug.to_string(), v))
    });
    let mut any = false;
    for (component, vuln) in core.chain(per_asset) {
        any = true;
        vulns.add_row(vec![
            Cell::new(component),
            Cell::new(&vuln.title),
            Cell::new(vuln.vuln_type.as_deref().unwrap_or("-")),
            Cell::new(vuln.fixed_in.as_deref().unwrap_or("not fixed")).fg(Color::Yellow),
            Cell::new(if vuln.references.cve.is_empty() {
                "-".to_string()
            } else {
                vuln.references
                    .cve
                    .iter()
                    .map(|c| format!("CVE-{}", c.trim_start_matches("CVE-")))
                    .collect::<Vec<_>>()
                    .join(", ")
            }),
        ]);
    }
    if any {
        writeln!(writer, "{}", vulns).map_err(Error::OutputFailed)?;
    } else {
        writeln!(writer, "No known vulnerabilities found.").map_err(Error::OutputFailed)?;
    }
    Ok(())
}

fn status_cell(status: ScanStatus) -> Cell {
    let color = match status {
        ScanStatus::Finished => Color::Green,
        ScanStatus::Failed => Color::Red,
        _ => Color::Yellow,
    };
    Cell::new(status.to_string()).fg(color)
}

/// Add a row for a plugin or theme
fn add_component_row(table: &mut Table, kind: &str, slug: &str, finding: &AssetFinding) {
    let count = finding.vulnerabilities.len();
    let vuln_cell = if count == 0 {
        Cell::new("0").fg(Color::Green)
    } else {
        Cell::new(count).fg(Color::Red).add_attribute(Attribute::Bold)
    };

    table.add_row(vec![
        Cell::new(kind),
        Cell::new(finding.friendly_name.as_deref().unwrap_or(slug)),
        Cell::new(&finding.current_version),
        Cell::new(finding.latest_version.as_deref().unwrap_or("-")),
        vuln_cell.set_alignment(CellAlignment::Center),
    ]);
}
