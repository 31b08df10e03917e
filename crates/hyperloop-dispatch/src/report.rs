//! Command error reports.

use console::Style;

use crate::command::CommandError;

/// Formats a failed command's error for the log.
///
/// The message and its causes come first. When a [`CommandError`] sits in
/// the chain, its trace follows, then one line per known position.
pub fn format_error(err: &anyhow::Error) -> String {
    let mut lines = vec![format!("{err:#}")];

    let details = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<CommandError>());
    if let Some(details) = details {
        if let Some(trace) = details.trace.as_deref().filter(|t| !t.is_empty()) {
            lines.push(trace.to_string());
        }
        for (label, value) in [
            ("line", details.line),
            ("column", details.column),
            ("position", details.position),
        ] {
            if let Some(value) = value {
                lines.push(format!("{label} {value}"));
            }
        }
    }

    lines.join("\n")
}

/// Remediation hints logged after an error report.
pub fn hints(use_color: bool) -> [String; 2] {
    let hint = Style::new().yellow().bold().force_styling(use_color);
    let note = Style::new().dim().force_styling(use_color);
    [
        format!(
            "{} If you think you have found a bug, run again with --report to report it.",
            hint.apply_to("Hint:")
        ),
        note.apply_to("Running with --debug can also give you more information on what is going wrong.")
            .to_string(),
    ]
}
