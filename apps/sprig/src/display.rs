//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use sprig_config::ColorChoice;
use sprig_install::NodeStatus;
use sprig_ops::{InstallReport, InstalledPackage, OperationResult};
use std::io;
use std::time::Duration;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    json_output: bool,
    colors: bool,
}

impl OutputRenderer {
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        let colors = match color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => Term::stdout().features().colors_supported(),
        };
        Self {
            json_output,
            colors,
        }
    }

    /// Render operation result
    pub fn render_result(&self, result: &OperationResult) -> io::Result<()> {
        if self.json_output {
            self.render_json(result)
        } else {
            self.render_text(result);
            Ok(())
        }
    }

    /// A concrete DAG prints bare so the output can be reloaded
    fn render_json(&self, result: &OperationResult) -> io::Result<()> {
        let json = match result {
            OperationResult::ConcreteDag(dag) => dag.to_json().map_err(io::Error::other)?,
            other => other.to_json().map_err(io::Error::other)?,
        };
        println!("{json}");
        Ok(())
    }

    fn render_text(&self, result: &OperationResult) {
        match result {
            OperationResult::Specs(specs) => {
                for spec in specs {
                    println!("{spec}");
                }
            }
            OperationResult::ConcreteDag(dag) => print!("{dag}"),
            OperationResult::InstallReport(report) => self.render_install_report(report),
            OperationResult::PackageList(packages) => self.render_package_list(packages),
        }
    }

    fn render_install_report(&self, report: &InstallReport) {
        let mut table = self.table(&["Package", "Version", "Hash", "Status"]);
        for node in &report.nodes {
            let status = Cell::new(node.status.to_string());
            let status = if self.colors {
                status.fg(status_color(node.status))
            } else {
                status
            };
            table.add_row(vec![
                Cell::new(&node.name),
                Cell::new(node.version.to_string()),
                Cell::new(node.hash.short()),
                status,
            ]);
        }
        println!("{table}");

        for node in report.nodes.iter().filter(|n| n.error.is_some()) {
            let label = self.style(Style::new().red().bold()).apply_to(&node.name);
            if let Some(error) = &node.error {
                println!("{label}: {error}");
            }
            if let Some(log) = &node.log_path {
                println!("  log: {}", log.display());
            }
        }

        let summary = format!(
            "{} node(s) in {:.1}s",
            report.nodes.len(),
            Duration::from_millis(report.duration_ms).as_secs_f64()
        );
        if report.success {
            println!("{}", self.style(Style::new().green()).apply_to(summary));
        } else {
            println!("{}", self.style(Style::new().red()).apply_to(summary));
        }
    }

    fn render_package_list(&self, packages: &[InstalledPackage]) {
        if packages.is_empty() {
            println!("No packages installed.");
            return;
        }
        let mut table = self.table(&["Package", "Version", "Hash", "Status", "Prefix"]);
        for package in packages {
            let mut name = Cell::new(&package.name);
            if package.explicit && self.colors {
                name = name.add_attribute(Attribute::Bold);
            }
            table.add_row(vec![
                name,
                Cell::new(package.version.to_string()),
                Cell::new(package.hash.short()),
                Cell::new(package.status.to_string()),
                Cell::new(package.prefix.display()),
            ]);
        }
        println!("{table}");
    }

    fn table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(headers.iter().map(|h| {
                let cell = Cell::new(h);
                if self.colors {
                    cell.add_attribute(Attribute::Bold)
                } else {
                    cell
                }
            }));
        if !self.colors {
            table.force_no_tty();
        }
        table
    }

    fn style(&self, style: Style) -> Style {
        if self.colors {
            style.force_styling(true)
        } else {
            Style::new()
        }
    }
}

fn status_color(status: NodeStatus) -> Color {
    match status {
        NodeStatus::Installed => Color::Green,
        NodeStatus::AlreadyInstalled => Color::Cyan,
        NodeStatus::Failed => Color::Red,
        NodeStatus::SkippedDueToDependencyFailure | NodeStatus::Cancelled => Color::Yellow,
    }
}
