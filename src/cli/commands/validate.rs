//! `validate`: check configuration files without starting the bot.

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::ConfigLoader;
use crate::error::{ConfigError, Severity, TimeBombError, ValidationIssue};

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Validates each file in turn, reporting every file before failing.
///
/// # Errors
///
/// Returns the first file's config error if any file is invalid (or, with
/// `--strict`, has warnings).
pub fn run(args: &ValidateArgs) -> Result<(), TimeBombError> {
    let loader = ConfigLoader::new();
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<ConfigError> = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let file = path.display().to_string();

        let outcome = loader.load(path).and_then(|loaded| {
            let warnings: Vec<String> = loaded
                .warnings
                .iter()
                .map(|w| match &w.location {
                    Some(location) => format!("{} at {location}", w.message),
                    None => w.message.clone(),
                })
                .collect();
            if args.strict && !warnings.is_empty() {
                return Err(ConfigError::ValidationError {
                    path: file.clone(),
                    errors: loaded
                        .warnings
                        .iter()
                        .map(|w| ValidationIssue {
                            path: w.location.clone().unwrap_or_default(),
                            message: w.message.clone(),
                            severity: Severity::Warning,
                        })
                        .collect(),
                });
            }
            Ok(warnings)
        });

        let report = match outcome {
            Ok(warnings) => FileReport {
                file,
                valid: true,
                errors: Vec::new(),
                warnings,
            },
            Err(e) => {
                let report = FileReport {
                    file,
                    valid: false,
                    errors: issues(&e),
                    warnings: Vec::new(),
                };
                first_error.get_or_insert(e);
                report
            }
        };
        reports.push(report);
    }

    match args.format {
        OutputFormat::Human => {
            for report in &reports {
                let mark = if report.valid { "ok" } else { "invalid" };
                println!("{}: {mark}", report.file);
                for error in &report.errors {
                    println!("  error: {error}");
                }
                for warning in &report.warnings {
                    println!("  warning: {warning}");
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}

fn issues(error: &ConfigError) -> Vec<String> {
    match error {
        ConfigError::ValidationError { errors, .. } => {
            errors.iter().map(ToString::to_string).collect()
        }
        other => vec![other.to_string()],
    }
}
